#![cfg(test)]

use std::{collections::BTreeSet, sync::Arc};

use agora_memory_store::MemoryStore;

use crate::api::{
    millis_to_time, DocPath, Forum, ForumId, Post, PostId, Record, Store, Thread, ThreadId,
    ThreadRef, Time, UserId,
};

pub fn t(ms: i64) -> Time {
    millis_to_time(ms).unwrap()
}

pub fn uid(s: &str) -> UserId {
    UserId::from(s)
}

pub fn post(forum: &str, thread: &str, id: &str, author: &str, ms: i64) -> Post {
    Post {
        id: PostId::from(id),
        parent_forum: Some(ForumId::from(forum)),
        parent_thread: Some(ThreadId::from(thread)),
        uid: uid(author),
        content: format!("content of {id}"),
        created_time: t(ms),
        updated_time: Some(t(ms)),
        updated_by: None,
        reactions: Default::default(),
        unread_by: BTreeSet::new(),
    }
}

pub async fn put<R: Record>(store: &MemoryStore, path: &DocPath, record: &R) {
    store.set(path, record.to_document().unwrap()).await.unwrap();
}

/// Seeds a forum holding one thread, whose aggregates match `posts` (`(id, author, time)`)
pub async fn seed_thread(
    store: &MemoryStore,
    forum: &str,
    thread: &str,
    posts: &[(&str, &str, i64)],
) -> ThreadRef {
    let tref = ThreadRef::new(ForumId::from(forum), ThreadId::from(thread));
    let (_, last_by, last_ms) = posts.last().copied().unwrap_or(("", "nobody", 0));
    let forum_doc = Forum {
        id: tref.forum.clone(),
        name: format!("forum {forum}"),
        updated_by: Some(uid(last_by)),
        updated_time: Some(t(last_ms)),
        unread_by: BTreeSet::new(),
    };
    if !store.contains(&DocPath::forum(&tref.forum)) {
        put(store, &DocPath::forum(&tref.forum), &forum_doc).await;
    }
    let thread_doc = Thread {
        id: tref.thread.clone(),
        forum_id: tref.forum.clone(),
        title: format!("thread {thread}"),
        priority: 0,
        created_by: uid(posts.first().map(|p| p.1).unwrap_or("nobody")),
        created_time: t(posts.first().map(|p| p.2).unwrap_or(0)),
        updated_by: uid(last_by),
        updated_time: t(last_ms),
        post_ids: posts.iter().map(|p| PostId::from(p.0)).collect(),
        post_count: posts.len() as u64,
        unread_by: BTreeSet::new(),
        is_sticky: false,
    };
    put(store, &tref.path(), &thread_doc).await;
    for (id, author, ms) in posts {
        let p = post(forum, thread, id, author, *ms);
        put(store, &tref.post(p.id.clone()).path(), &p).await;
    }
    tref
}

pub async fn thread_of(store: &MemoryStore, tref: &ThreadRef) -> Option<Thread> {
    let doc = store.get(&tref.path()).await.unwrap()?;
    Some(Thread::from_document(tref.thread.as_str(), doc).unwrap())
}

pub async fn forum_of(store: &MemoryStore, forum: &ForumId) -> Option<Forum> {
    let doc = store.get(&DocPath::forum(forum)).await.unwrap()?;
    Some(Forum::from_document(forum.as_str(), doc).unwrap())
}

pub async fn post_of(store: &MemoryStore, tref: &ThreadRef, id: &str) -> Option<Post> {
    let doc = store.get(&tref.post(PostId::from(id)).path()).await.unwrap()?;
    Some(Post::from_document(id, doc).unwrap())
}

pub fn new_store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::new())
}
