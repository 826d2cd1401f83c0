use std::{fmt, sync::Arc};

use crate::{
    aggregate::AggregateOp,
    api::{now, DocPath, Error, FieldUpdate, Post, PostRef, Record, Snapshot, Store, Viewer, Watch},
    store_ext, Aggregates, Session, Subscription,
};

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PostState {
    Loading,
    Loaded,
    /// `buffer` diverges from the live post until committed
    Editing { buffer: String },
    Submitting { buffer: String },
    Deleting,
    Deleted,
    /// Holds until acknowledged
    PermissionsError,
}

impl fmt::Display for PostState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PostState::Loading => "loading",
            PostState::Loaded => "loaded",
            PostState::Editing { .. } => "editing",
            PostState::Submitting { .. } => "submitting",
            PostState::Deleting => "deleting",
            PostState::Deleted => "deleted",
            PostState::PermissionsError => "permissions-error",
        };
        f.write_str(name)
    }
}

/// Optimistic edit/delete control over one live post
///
/// There is no lock against other writers: concurrent edits are last-write-wins.
pub struct PostMachine {
    store: Arc<dyn Store>,
    aggregates: Arc<Aggregates>,
    viewer: Viewer,
    at: PostRef,
    state: PostState,
    post: Option<Post>,
    sub: Option<Subscription>,
}

impl PostMachine {
    pub async fn open(session: &Session, at: PostRef) -> Result<PostMachine, Error> {
        let mut res = PostMachine {
            store: session.store.clone(),
            aggregates: session.aggregates.clone(),
            viewer: session.viewer.clone(),
            at,
            state: PostState::Loading,
            post: None,
            sub: None,
        };
        res.subscribe().await?;
        Ok(res)
    }

    async fn subscribe(&mut self) -> Result<(), Error> {
        let watch = Watch::Document(self.at.path());
        self.sub = Some(Subscription::watch(self.store.clone(), watch).await?);
        Ok(())
    }

    fn release(&mut self) {
        // Dropping cancels
        self.sub = None;
    }

    pub fn state(&self) -> &PostState {
        &self.state
    }

    pub fn post(&self) -> Option<&Post> {
        self.post.as_ref()
    }

    pub fn at(&self) -> &PostRef {
        &self.at
    }

    pub fn is_subscribed(&self) -> bool {
        self.sub.as_ref().map_or(false, |s| s.is_live())
    }

    pub fn can_modify(&self) -> bool {
        self.post
            .as_ref()
            .map_or(false, |p| self.viewer.can_modify(&p.uid))
    }

    fn bad_transition(&self, action: &str) -> Error {
        Error::InvalidArgument(format!("cannot {action} post {} while {}", self.at, self.state))
    }

    /// Waits for the next snapshot of the post and applies it
    ///
    /// Returns None once the subscription is released, eg. after deletion.
    pub async fn next_update(&mut self) -> Option<&PostState> {
        let snap = self.sub.as_mut()?.next().await?;
        self.apply_snapshot(snap);
        Some(&self.state)
    }

    pub fn apply_snapshot(&mut self, snap: Snapshot) {
        if matches!(self.state, PostState::Deleting | PostState::Deleted) {
            return;
        }
        let (id, doc) = match snap.single() {
            Some(single) => single,
            None => {
                tracing::debug!(post = %self.at, "post went away remotely");
                self.post = None;
                self.state = PostState::Deleted;
                self.release();
                return;
            }
        };
        match Post::from_document(id, doc.clone()) {
            Ok(post) => self.post = Some(post),
            Err(err) => {
                tracing::warn!(?err, post = %self.at, "ignoring malformed post snapshot");
                return;
            }
        }
        // Remote changes never touch an edit buffer
        if self.state == PostState::Loading {
            self.state = PostState::Loaded;
        }
    }

    pub fn begin_edit(&mut self) -> Result<(), Error> {
        if self.state != PostState::Loaded {
            return Err(self.bad_transition("edit"));
        }
        let post = self.post.as_ref().ok_or_else(|| self.bad_transition("edit"))?;
        if !self.viewer.can_modify(&post.uid) {
            return Err(Error::PermissionDenied);
        }
        self.state = PostState::Editing {
            buffer: post.content.clone(),
        };
        Ok(())
    }

    pub fn set_buffer(&mut self, content: String) -> Result<(), Error> {
        if let PostState::Editing { buffer } = &mut self.state {
            *buffer = content;
            return Ok(());
        }
        Err(self.bad_transition("change the edit buffer of"))
    }

    pub fn buffer(&self) -> Option<&str> {
        match &self.state {
            PostState::Editing { buffer } | PostState::Submitting { buffer } => {
                Some(buffer.as_str())
            }
            _ => None,
        }
    }

    /// Discards the edit buffer without writing anything
    pub fn cancel_edit(&mut self) -> Result<(), Error> {
        match self.state {
            PostState::Editing { .. } => {
                self.state = PostState::Loaded;
                Ok(())
            }
            _ => Err(self.bad_transition("cancel editing")),
        }
    }

    /// Writes the edit buffer as the new content of the post
    ///
    /// On a permission failure the machine holds `PermissionsError` until
    /// acknowledged; on any other failure it goes back to `Editing` with the
    /// buffer kept. Nothing is retried.
    pub async fn commit_edit(&mut self) -> Result<(), Error> {
        let buffer = match &self.state {
            PostState::Editing { buffer } => buffer.clone(),
            _ => return Err(self.bad_transition("commit")),
        };
        Post::validate_content(&buffer)?;
        self.state = PostState::Submitting {
            buffer: buffer.clone(),
        };
        let time = now();
        let updates = vec![
            FieldUpdate::set("content", buffer.as_str()),
            FieldUpdate::set_time("updatedTime", &time),
            FieldUpdate::set("updatedBy", self.viewer.uid.as_str()),
        ];
        match store_ext::update(&*self.store, &self.at.path(), updates).await {
            Ok(()) => {
                self.state = PostState::Loaded;
                // The edit is the latest activity of the thread and forum
                self.aggregates
                    .replay(vec![
                        AggregateOp::PropagateTimestamp {
                            target: self.at.thread.path(),
                            time,
                            by: self.viewer.uid.clone(),
                        },
                        AggregateOp::PropagateTimestamp {
                            target: DocPath::forum(self.at.forum()),
                            time,
                            by: self.viewer.uid.clone(),
                        },
                    ])
                    .await;
                Ok(())
            }
            Err(err) => {
                tracing::warn!(?err, post = %self.at, "failed committing post edit");
                self.state = match &err {
                    Error::PermissionDenied => PostState::PermissionsError,
                    Error::NotFound(_) => {
                        self.post = None;
                        self.release();
                        PostState::Deleted
                    }
                    _ => PostState::Editing { buffer },
                };
                Err(err)
            }
        }
    }

    /// Deletes the post, and removes it from its thread
    ///
    /// The subscription is released first. Deleting the only post of a thread
    /// deletes the thread. The thread is recounted only after both the
    /// document deletion and the removal from `postIds` completed.
    pub async fn delete(&mut self) -> Result<(), Error> {
        if self.state != PostState::Loaded {
            return Err(self.bad_transition("delete"));
        }
        if !self.can_modify() {
            return Err(Error::PermissionDenied);
        }
        self.release();
        self.state = PostState::Deleting;
        let path = self.at.path();
        let (deleted, removed) = futures::join!(
            store_ext::delete(&*self.store, &path),
            self.aggregates.post_removed(&self.at.thread, &self.at.post),
        );
        match deleted.and(removed.map(|_| ())) {
            Ok(()) => {
                tracing::debug!(post = %self.at, "deleted post");
                self.aggregates.recount_after_removal(&self.at.thread).await;
                self.post = None;
                self.state = PostState::Deleted;
                Ok(())
            }
            Err(err) => {
                tracing::warn!(?err, post = %self.at, "failed deleting post");
                self.state = PostState::PermissionsError;
                Err(err)
            }
        }
    }

    /// Leaves `PermissionsError`, re-opening the subscription if it was released
    pub async fn acknowledge_error(&mut self) -> Result<(), Error> {
        if self.state != PostState::PermissionsError {
            return Err(self.bad_transition("acknowledge an error of"));
        }
        if !self.is_subscribed() {
            self.subscribe().await?;
            self.state = PostState::Loading;
        } else if self.post.is_some() {
            self.state = PostState::Loaded;
        } else {
            self.state = PostState::Loading;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        api::{Claims, PostId, ThreadRef},
        test_util::*,
        Config,
    };
    use agora_memory_store::{Access, MemoryStore};
    use async_trait::async_trait;

    /// Delegates to a memory store, letting other tasks run before each deletion applies
    struct SlowDeletes(Arc<MemoryStore>);

    #[async_trait]
    impl Store for SlowDeletes {
        async fn get(&self, path: &DocPath) -> Result<Option<crate::api::Document>, Error> {
            self.0.get(path).await
        }

        async fn list(
            &self,
            collection: &crate::api::CollectionPath,
        ) -> Result<Vec<(String, crate::api::Document)>, Error> {
            self.0.list(collection).await
        }

        async fn subscribe(
            &self,
            watch: Watch,
        ) -> Result<(crate::api::WatchId, crate::api::SnapshotStream), Error> {
            self.0.subscribe(watch).await
        }

        fn unsubscribe(&self, id: crate::api::WatchId) {
            self.0.unsubscribe(id)
        }

        async fn set(&self, path: &DocPath, doc: crate::api::Document) -> Result<(), Error> {
            self.0.set(path, doc).await
        }

        async fn update(&self, path: &DocPath, updates: Vec<FieldUpdate>) -> Result<(), Error> {
            self.0.update(path, updates).await
        }

        async fn add(
            &self,
            collection: &crate::api::CollectionPath,
            doc: crate::api::Document,
        ) -> Result<String, Error> {
            self.0.add(collection, doc).await
        }

        async fn delete(&self, path: &DocPath) -> Result<(), Error> {
            for _ in 0..10 {
                tokio::task::yield_now().await;
            }
            self.0.delete(path).await
        }
    }

    fn session(store: &Arc<MemoryStore>, who: &str, claims: Claims) -> Session {
        Session::new(store.clone(), Config::default(), Viewer::new(uid(who), claims))
    }

    async fn loaded(s: &Session, tref: &ThreadRef, id: &str) -> PostMachine {
        let mut m = PostMachine::open(s, tref.post(PostId::from(id))).await.unwrap();
        assert_eq!(m.next_update().await, Some(&PostState::Loaded));
        m
    }

    async fn three_posts(store: &MemoryStore) -> ThreadRef {
        seed_thread(
            store,
            "f",
            "t",
            &[("p1", "alice", 1_000), ("p2", "bob", 2_000), ("p3", "carol", 3_000)],
        )
        .await
    }

    #[tokio::test]
    async fn cancelling_an_edit_writes_nothing() {
        let store = new_store();
        let tref = three_posts(&store).await;
        let before = post_of(&store, &tref, "p2").await.unwrap();
        let mut m = loaded(&session(&store, "bob", Claims::none()), &tref, "p2").await;
        m.begin_edit().unwrap();
        assert_eq!(m.buffer(), Some(before.content.as_str()));
        m.set_buffer(String::from("something else")).unwrap();
        m.cancel_edit().unwrap();
        assert_eq!(m.state(), &PostState::Loaded);
        let after = post_of(&store, &tref, "p2").await.unwrap();
        assert_eq!(after.content, before.content);
        assert_eq!(after.updated_time, before.updated_time);
    }

    #[tokio::test]
    async fn only_author_or_admin_may_edit() {
        let store = new_store();
        let tref = three_posts(&store).await;
        let mut m = loaded(&session(&store, "mallory", Claims::none()), &tref, "p2").await;
        assert_eq!(m.begin_edit(), Err(Error::PermissionDenied));
        assert_eq!(m.state(), &PostState::Loaded);
        assert_eq!(m.delete().await, Err(Error::PermissionDenied));

        let mut m = loaded(&session(&store, "root", Claims::admin()), &tref, "p2").await;
        assert!(m.begin_edit().is_ok());
    }

    #[tokio::test]
    async fn commit_writes_content_and_editor() {
        let store = new_store();
        let tref = three_posts(&store).await;
        let mut m = loaded(&session(&store, "root", Claims::admin()), &tref, "p1").await;
        m.begin_edit().unwrap();
        m.set_buffer(String::from("fixed typo")).unwrap();
        m.commit_edit().await.unwrap();
        assert_eq!(m.state(), &PostState::Loaded);
        m.next_update().await.unwrap();
        let live = m.post().unwrap();
        assert_eq!(live.content, "fixed typo");
        assert_eq!(live.updated_by, Some(uid("root")));
        assert_eq!(live.uid, uid("alice"));
        let thread = thread_of(&store, &tref).await.unwrap();
        assert_eq!(thread.updated_by, uid("root"));
        assert_eq!(Some(thread.updated_time), live.updated_time);
    }

    #[tokio::test]
    async fn commit_failures() {
        let store = new_store();
        let tref = three_posts(&store).await;
        let mut m = loaded(&session(&store, "alice", Claims::none()), &tref, "p1").await;

        m.begin_edit().unwrap();
        m.set_buffer(String::from("draft")).unwrap();
        let offline = Error::Transient(String::from("offline"));
        store.fail("forums/f/threads/t/posts/p1", Access::Write, offline);
        assert!(m.commit_edit().await.is_err());
        assert_eq!(m.buffer(), Some("draft"));
        assert!(matches!(m.state(), PostState::Editing { .. }));

        store.clear_failures();
        store.fail("forums/f/threads/t/posts/p1", Access::Write, Error::PermissionDenied);
        assert_eq!(m.commit_edit().await, Err(Error::PermissionDenied));
        assert_eq!(m.state(), &PostState::PermissionsError);
        assert!(m.begin_edit().is_err());
        m.acknowledge_error().await.unwrap();
        assert_eq!(m.state(), &PostState::Loaded);
        assert_eq!(post_of(&store, &tref, "p1").await.unwrap().content, "content of p1");
    }

    #[tokio::test]
    async fn remote_changes_spare_the_buffer() {
        let store = new_store();
        let tref = three_posts(&store).await;
        let mut m = loaded(&session(&store, "alice", Claims::none()), &tref, "p1").await;
        m.begin_edit().unwrap();
        m.set_buffer(String::from("mine")).unwrap();
        let p1 = tref.post(PostId::from("p1")).path();
        store.update(&p1, vec![FieldUpdate::set("content", "theirs")]).await.unwrap();
        m.next_update().await.unwrap();
        assert_eq!(m.post().unwrap().content, "theirs");
        assert_eq!(m.buffer(), Some("mine"));

        store.delete(&p1).await.unwrap();
        assert_eq!(m.next_update().await, Some(&PostState::Deleted));
        assert!(!m.is_subscribed());
        assert_eq!(m.next_update().await, None);
    }

    #[tokio::test]
    async fn deleting_a_middle_post() {
        let store = new_store();
        let tref = three_posts(&store).await;
        let mut m = loaded(&session(&store, "bob", Claims::none()), &tref, "p2").await;
        m.delete().await.unwrap();
        assert_eq!(m.state(), &PostState::Deleted);
        assert!(!m.is_subscribed());
        assert_eq!(store.num_watches(), 0);
        let thread = thread_of(&store, &tref).await.unwrap();
        assert_eq!(thread.post_ids, vec![PostId::from("p1"), PostId::from("p3")]);
        assert_eq!((thread.updated_time, thread.updated_by), (t(3_000), uid("carol")));
        assert!(post_of(&store, &tref, "p2").await.is_none());
    }

    #[tokio::test]
    async fn slow_deletions_still_leave_a_consistent_count() {
        let store = new_store();
        let tref = three_posts(&store).await;
        let slow = Arc::new(SlowDeletes(store.clone()));
        let s = Session::new(slow, Config::default(), Viewer::new(uid("bob"), Claims::none()));
        let mut m = loaded(&s, &tref, "p2").await;
        m.delete().await.unwrap();
        let thread = thread_of(&store, &tref).await.unwrap();
        assert_eq!(thread.post_ids, vec![PostId::from("p1"), PostId::from("p3")]);
        assert_eq!(thread.post_count, 2);
        assert_eq!(store.list(&tref.posts()).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn deleting_the_last_post() {
        let store = new_store();
        let tref = three_posts(&store).await;
        let mut m = loaded(&session(&store, "carol", Claims::none()), &tref, "p3").await;
        m.delete().await.unwrap();
        let thread = thread_of(&store, &tref).await.unwrap();
        assert_eq!(thread.post_ids, vec![PostId::from("p1"), PostId::from("p2")]);
        let p2 = post_of(&store, &tref, "p2").await.unwrap();
        assert_eq!((thread.updated_time, thread.updated_by.clone()), p2.last_activity());
        assert_eq!(thread.updated_by, uid("bob"));
    }

    #[tokio::test]
    async fn deleting_the_only_post_deletes_the_thread() {
        let store = new_store();
        let tref = seed_thread(&store, "f", "t", &[("p1", "alice", 1_000)]).await;
        let mut m = loaded(&session(&store, "alice", Claims::none()), &tref, "p1").await;
        m.delete().await.unwrap();
        assert!(thread_of(&store, &tref).await.is_none());
        assert!(post_of(&store, &tref, "p1").await.is_none());
    }

    #[tokio::test]
    async fn failed_delete_recovers_after_acknowledgement() {
        let store = new_store();
        let tref = three_posts(&store).await;
        let mut m = loaded(&session(&store, "bob", Claims::none()), &tref, "p2").await;
        store.fail("forums/f/threads/t/posts/p2", Access::Write, Error::PermissionDenied);
        assert_eq!(m.delete().await, Err(Error::PermissionDenied));
        assert_eq!(m.state(), &PostState::PermissionsError);
        assert!(!m.is_subscribed());

        store.clear_failures();
        m.acknowledge_error().await.unwrap();
        assert!(m.is_subscribed());
        assert_eq!(m.next_update().await, Some(&PostState::Loaded));
        assert_eq!(m.post().unwrap().id, PostId::from("p2"));
    }
}
