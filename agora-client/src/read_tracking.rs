use std::{collections::BTreeSet, fmt, sync::Arc};

use futures::future;
use serde_json::Value;

use crate::{
    api::{
        DocPath, Document, Error, FieldUpdate, ForumId, Post, PostRef, Store, Thread, ThreadId,
        ThreadRef, UserId,
    },
    store_ext,
};

/// Level at which read state is tracked, each independently of the others
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Scope {
    Forum(ForumId),
    Thread(ThreadRef),
    Post(PostRef),
}

impl Scope {
    pub fn path(&self) -> DocPath {
        match self {
            Scope::Forum(f) => DocPath::forum(f),
            Scope::Thread(t) => t.path(),
            Scope::Post(p) => p.path(),
        }
    }

    /// The post, its thread and its forum
    pub fn cascade(post: &PostRef) -> [Scope; 3] {
        [
            Scope::Post(post.clone()),
            Scope::Thread(post.thread.clone()),
            Scope::Forum(post.forum().clone()),
        ]
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.path().fmt(f)
    }
}

/// Per-user notification mutes, stored in the private user document
#[derive(Clone, Debug, Default, Eq, PartialEq, serde::Deserialize)]
pub struct Mutes {
    #[serde(default)]
    pub forums: BTreeSet<ForumId>,
    #[serde(default)]
    pub threads: BTreeSet<ThreadId>,
}

pub struct ReadTracker {
    store: Arc<dyn Store>,
}

impl ReadTracker {
    pub fn new(store: Arc<dyn Store>) -> ReadTracker {
        ReadTracker { store }
    }

    /// Removes `uid` from the `unreadBy` set of `scope`; idempotent
    pub async fn mark_read(&self, uid: &UserId, scope: &Scope) -> Result<(), Error> {
        store_ext::update(
            &*self.store,
            &scope.path(),
            vec![FieldUpdate::array_remove("unreadBy", vec![uid.as_str().into()])],
        )
        .await
    }

    /// Marks `post` read at all three scopes, returning the scopes whose write failed
    pub async fn mark_post_read(&self, uid: &UserId, post: &PostRef) -> Vec<(Scope, Error)> {
        let scopes = Scope::cascade(post);
        let results = future::join_all(scopes.iter().map(|s| self.mark_read(uid, s))).await;
        collect_failures(scopes, results)
    }

    /// Adds every participant but `author` to `unreadBy` at post, thread and forum scope
    ///
    /// The three writes are independent and unordered; failed ones are logged and returned.
    pub async fn mark_unread(
        &self,
        author: &UserId,
        post: &PostRef,
        participants: impl IntoIterator<Item = UserId>,
    ) -> Vec<(Scope, Error)> {
        let readers = participants
            .into_iter()
            .filter(|p| p != author)
            .map(|p| Value::from(p.0))
            .collect::<Vec<_>>();
        if readers.is_empty() {
            return Vec::new();
        }
        let scopes = Scope::cascade(post);
        let paths = scopes.iter().map(Scope::path).collect::<Vec<_>>();
        let results = future::join_all(paths.iter().map(|path| {
            store_ext::update(
                &*self.store,
                path,
                vec![FieldUpdate::array_union("unreadBy", readers.clone())],
            )
        }))
        .await;
        collect_failures(scopes, results)
    }

    /// Users that took part in `thread`: its creator and every post author
    pub async fn participants(&self, thread: &ThreadRef) -> Result<BTreeSet<UserId>, Error> {
        let mut res = BTreeSet::new();
        if let Some(t) = store_ext::get_record::<Thread>(&*self.store, &thread.path()).await? {
            res.insert(t.created_by);
        }
        let posts = store_ext::list_records::<Post>(&*self.store, &thread.posts()).await?;
        res.extend(posts.into_iter().map(|p| p.uid));
        Ok(res)
    }

    pub async fn mutes(&self, uid: &UserId) -> Result<Mutes, Error> {
        let doc = self.store.get(&DocPath::user(uid)).await?.unwrap_or_default();
        match doc.get("notifications") {
            None => Ok(Mutes::default()),
            Some(n) => serde_json::from_value(n.clone())
                .map_err(|e| Error::Malformed(format!("notifications of user {uid}: {e}"))),
        }
    }

    pub async fn set_forum_muted(
        &self,
        uid: &UserId,
        forum: &ForumId,
        muted: bool,
    ) -> Result<(), Error> {
        self.set_muted(uid, "forums", forum.as_str(), muted).await
    }

    pub async fn set_thread_muted(
        &self,
        uid: &UserId,
        thread: &ThreadId,
        muted: bool,
    ) -> Result<(), Error> {
        self.set_muted(uid, "threads", thread.as_str(), muted).await
    }

    async fn set_muted(
        &self,
        uid: &UserId,
        kind: &str,
        id: &str,
        muted: bool,
    ) -> Result<(), Error> {
        let field = format!("notifications.{kind}");
        let value = vec![Value::from(id)];
        let update = match muted {
            true => FieldUpdate::array_union(field, value),
            false => FieldUpdate::array_remove(field, value),
        };
        let path = DocPath::user(uid);
        match store_ext::update(&*self.store, &path, vec![update]).await {
            // The private user document is created by the first mute
            Err(e) if e.is_not_found() && muted => {
                let doc = match serde_json::json!({ "notifications": { kind: [id] } }) {
                    Value::Object(doc) => doc,
                    _ => Document::new(),
                };
                store_ext::set_doc(&*self.store, &path, doc).await
            }
            res => res,
        }
    }
}

fn collect_failures(scopes: [Scope; 3], results: Vec<Result<(), Error>>) -> Vec<(Scope, Error)> {
    let mut failed = Vec::new();
    for (scope, res) in scopes.into_iter().zip(results) {
        match res {
            Ok(()) => (),
            Err(error) if error.is_not_found() => {
                tracing::debug!(%scope, "read-state target already gone");
            }
            Err(error) => {
                tracing::warn!(?error, %scope, "failed updating read state");
                failed.push((scope, error));
            }
        }
    }
    failed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{api::PostId, test_util::*};
    use agora_memory_store::{Access, MemoryStore};
    use std::panic::AssertUnwindSafe;

    fn unread_at(store: &MemoryStore, scope: &Scope) -> Vec<Value> {
        store
            .doc(&scope.path())
            .and_then(|d| d.get("unreadBy").cloned())
            .and_then(|v| v.as_array().cloned())
            .unwrap_or_default()
    }

    #[test]
    fn mark_read_twice_is_mark_read_once() {
        let runtime = AssertUnwindSafe(
            tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("failed initializing tokio runtime"),
        );
        bolero::check!()
            .with_type::<(Vec<u8>, u8)>()
            .cloned()
            .for_each(move |(unread, reader)| {
                runtime.block_on(async {
                    let reader = uid(&reader.to_string());
                    let mut once = None;
                    for times in [1, 2] {
                        let store = new_store();
                        let tref = seed_thread(&store, "f", "t", &[("p1", "a", 1)]).await;
                        let scope = Scope::Thread(tref.clone());
                        let unread = unread.iter().map(|u| Value::from(u.to_string())).collect();
                        let set = FieldUpdate::set("unreadBy", Value::Array(unread));
                        store.update(&scope.path(), vec![set]).await.unwrap();
                        let tracker = ReadTracker::new(store.clone());
                        for _ in 0..times {
                            tracker.mark_read(&reader, &scope).await.unwrap();
                        }
                        let res = unread_at(&store, &scope);
                        assert!(!res.contains(&Value::from(reader.as_str())));
                        match &once {
                            None => once = Some(res),
                            Some(once) => assert_eq!(once, &res),
                        }
                    }
                })
            })
    }

    #[tokio::test]
    async fn unread_marks_every_participant_but_the_author() {
        let store = new_store();
        let tref = seed_thread(&store, "f", "t", &[("p1", "alice", 1), ("p2", "bob", 2)]).await;
        let tracker = ReadTracker::new(store.clone());
        let participants = tracker.participants(&tref).await.unwrap();
        assert_eq!(participants, [uid("alice"), uid("bob")].into_iter().collect());

        let p2 = tref.post(PostId::from("p2"));
        assert!(tracker.mark_unread(&uid("bob"), &p2, participants).await.is_empty());
        for scope in Scope::cascade(&p2) {
            assert_eq!(unread_at(&store, &scope), vec![Value::from("alice")]);
        }

        assert!(tracker.mark_post_read(&uid("alice"), &p2).await.is_empty());
        for scope in Scope::cascade(&p2) {
            assert!(unread_at(&store, &scope).is_empty());
        }
    }

    #[tokio::test]
    async fn failed_scopes_do_not_block_the_others() {
        let store = new_store();
        let tref = seed_thread(&store, "f", "t", &[("p1", "alice", 1)]).await;
        let p1 = tref.post(PostId::from("p1"));
        store.fail("forums/f/threads/t/posts", Access::Write, Error::PermissionDenied);
        let failed = tracker_mark(&store, &p1).await;
        assert_eq!(failed, vec![(Scope::Post(p1.clone()), Error::PermissionDenied)]);
        assert_eq!(unread_at(&store, &Scope::Forum(tref.forum.clone())), vec![Value::from("bob")]);
    }

    async fn tracker_mark(store: &Arc<MemoryStore>, post: &PostRef) -> Vec<(Scope, Error)> {
        ReadTracker::new(store.clone())
            .mark_unread(&uid("alice"), post, vec![uid("alice"), uid("bob")])
            .await
    }

    #[tokio::test]
    async fn mutes() {
        let store = new_store();
        let tracker = ReadTracker::new(store.clone());
        let me = uid("u1");
        assert_eq!(tracker.mutes(&me).await.unwrap(), Mutes::default());
        tracker.set_forum_muted(&me, &ForumId::from("f1"), true).await.unwrap();
        tracker.set_thread_muted(&me, &ThreadId::from("t1"), true).await.unwrap();
        tracker.set_thread_muted(&me, &ThreadId::from("t2"), true).await.unwrap();
        tracker.set_thread_muted(&me, &ThreadId::from("t1"), false).await.unwrap();
        let mutes = tracker.mutes(&me).await.unwrap();
        assert_eq!(mutes.forums, [ForumId::from("f1")].into_iter().collect());
        assert_eq!(mutes.threads, [ThreadId::from("t2")].into_iter().collect());
    }
}
