//! Prints a JSON dump of a forum in the legacy flat layout, loadable by `agora-ctl`

use std::collections::{BTreeMap, BTreeSet};

use agora_api::{
    millis_to_time, new_doc_id, CollectionPath, DocPath, Forum, ForumId, Invite, InviteId, Post,
    PostId, Record, Thread, ThreadId, Time, UserId, UserProfile,
};
use chrono::Duration;
use rand::{seq::SliceRandom, Rng};

const NUM_USERS: usize = 8;
const NUM_FORUMS: usize = 4;
const NUM_THREADS: usize = 40;
const MAX_POSTS_PER_THREAD: usize = 60;
const NUM_INVITES: usize = 10;

const THREAD_TITLE_LEN: usize = 6;
const POST_WORD_COUNT: usize = 40;

// 2018-09-03, when the forum opened
const START_MS: i64 = 1_535_932_800_000;

fn put(dump: &mut BTreeMap<String, serde_json::Value>, path: DocPath, record: &impl Record) {
    let doc = record.to_document().expect("records always serialize to objects");
    dump.insert(path.to_string(), serde_json::Value::Object(doc));
}

fn gen_time(rng: &mut impl Rng, after: Time) -> Time {
    after + Duration::minutes(rng.gen_range(1..3 * 24 * 60))
}

fn main() {
    let mut rng = rand::thread_rng();
    let mut dump = BTreeMap::new();
    let start = millis_to_time(START_MS).expect("start time is in range");

    // Generate users
    let users = (0..NUM_USERS)
        .map(|i| UserId::from(format!("user{i}")))
        .collect::<Vec<_>>();
    for uid in &users {
        let profile = UserProfile {
            uid: uid.clone(),
            display_name: lipsum::lipsum_words(2),
            photo_url: None,
            avatar_url: rng
                .gen_bool(0.5)
                .then(|| format!("https://avatars.invalid/{uid}.png")),
            unknown: false,
        };
        put(&mut dump, DocPath::user_public(uid), &profile);
        put(&mut dump, DocPath::user(uid), &profile);
    }

    // Generate forums
    let forums = (0..NUM_FORUMS)
        .map(|i| ForumId::from(format!("forum{i}")))
        .collect::<Vec<_>>();
    for id in &forums {
        let forum = Forum {
            id: id.clone(),
            name: lipsum::lipsum_words(2),
            updated_by: None,
            updated_time: None,
            unread_by: BTreeSet::new(),
        };
        put(&mut dump, DocPath::forum(id), &forum);
    }

    // Generate threads along with their posts, in the legacy flat collections
    for _ in 0..NUM_THREADS {
        let id = ThreadId::from(new_doc_id());
        let forum = forums.choose(&mut rng).expect("there are forums").clone();
        let created_by = users.choose(&mut rng).expect("there are users").clone();
        let created_time = gen_time(&mut rng, start);

        let (mut time, mut by) = (created_time, created_by.clone());
        let mut post_ids = Vec::new();
        for i in 0..rng.gen_range(1..=MAX_POSTS_PER_THREAD) {
            if i != 0 {
                time = gen_time(&mut rng, time);
                by = users.choose(&mut rng).expect("there are users").clone();
            }
            let post = Post {
                id: PostId::from(new_doc_id()),
                parent_forum: None,
                parent_thread: None,
                uid: by.clone(),
                content: lipsum::lipsum_words(rng.gen_range(1..POST_WORD_COUNT)),
                created_time: time,
                updated_time: None,
                updated_by: None,
                reactions: BTreeMap::new(),
                unread_by: BTreeSet::new(),
            };
            put(&mut dump, DocPath::legacy_post(&post.id), &post);
            post_ids.push(post.id);
        }

        let thread = Thread {
            id: id.clone(),
            forum_id: forum,
            title: lipsum::lipsum_words(THREAD_TITLE_LEN),
            priority: i64::from(rng.gen_ratio(1, 10)),
            created_by,
            created_time,
            updated_by: by,
            updated_time: time,
            post_count: post_ids.len() as u64,
            post_ids,
            unread_by: BTreeSet::new(),
            is_sticky: false,
        };
        put(&mut dump, DocPath::legacy_thread(&id), &thread);
    }

    // Generate invites
    for _ in 0..NUM_INVITES {
        let by = users.choose(&mut rng).expect("there are users").clone();
        let invite = Invite {
            id: InviteId::from(new_doc_id()),
            was_used: rng.gen_bool(0.3),
            created_at: gen_time(&mut rng, start),
            created_by_name: by.to_string(),
            created_by_uid: by,
        };
        put(&mut dump, CollectionPath::invites().doc(invite.id.as_str()), &invite);
    }

    println!(
        "{}",
        serde_json::to_string_pretty(&dump).expect("dumps always serialize")
    );
}
