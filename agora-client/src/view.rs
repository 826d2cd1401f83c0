//! Resource-scope views: each holds the subscription feeding one mirror, released on drop

use std::sync::Arc;

use crate::{
    aggregate::AggregateOp,
    api::{
        new_doc_id, now, validate_string, CollectionPath, Direction, DocPath, Error, Forum,
        ForumId, Post, PostId, Query, Record, Thread, ThreadId, ThreadRef, Watch,
    },
    pagination::{Page, PageRequest},
    store_ext, PostMachine, Session, Subscription,
};

pub struct ForumListView {
    session: Session,
    sub: Subscription,
}

impl ForumListView {
    pub async fn open(session: &Session) -> Result<ForumListView, Error> {
        let query = Query::all(CollectionPath::forums()).order_by("name", Direction::Asc);
        Ok(ForumListView {
            session: session.clone(),
            sub: Subscription::watch(session.store.clone(), Watch::Query(query)).await?,
        })
    }

    /// Waits for the next forum listing, and mirrors it into the session
    pub async fn next_update(&mut self) -> Option<Arc<Vec<Forum>>> {
        let forums = self.sub.next_records::<Forum>().await?;
        self.session.update_db(|db| db.replace_forums(forums));
        Some(self.forums())
    }

    pub fn forums(&self) -> Arc<Vec<Forum>> {
        self.session.db().forums
    }
}

pub struct ThreadListView {
    session: Session,
    forum: ForumId,
    sub: Subscription,
}

impl ThreadListView {
    /// Threads of `forum`, highest priority first, then most recently updated first
    pub async fn open(session: &Session, forum: ForumId) -> Result<ThreadListView, Error> {
        let query = Query::all(CollectionPath::threads(&forum))
            .order_by("priority", Direction::Desc)
            .order_by("updatedTime", Direction::Desc);
        Ok(ThreadListView {
            session: session.clone(),
            sub: Subscription::watch(session.store.clone(), Watch::Query(query)).await?,
            forum,
        })
    }

    /// Waits for the next thread listing, mirrors it, and resolves the users it names
    pub async fn next_update(&mut self) -> Option<Arc<Vec<Thread>>> {
        let threads = self.sub.next_records::<Thread>().await?;
        let uids = threads
            .iter()
            .flat_map(|t| [t.created_by.clone(), t.updated_by.clone()])
            .collect::<Vec<_>>();
        self.session
            .update_db(|db| db.replace_thread_list(&self.forum, threads));
        self.session.users.resolve_many(uids).await;
        Some(self.threads())
    }

    pub fn threads(&self) -> Arc<Vec<Thread>> {
        self.session
            .db()
            .thread_list(&self.forum)
            .unwrap_or_default()
    }

    /// Creates a thread along with its first post
    pub async fn create_thread(&self, title: &str, content: &str) -> Result<ThreadRef, Error> {
        create_thread(&self.session, &self.forum, title, content).await
    }
}

pub async fn create_thread(
    session: &Session,
    forum: &ForumId,
    title: &str,
    content: &str,
) -> Result<ThreadRef, Error> {
    validate_string(title)?;
    Post::validate_content(content)?;
    let store = &*session.store;
    let me = &session.viewer.uid;
    let at = ThreadRef::new(forum.clone(), ThreadId::from(new_doc_id()));
    let time = now();
    let post = Post {
        id: PostId::default(),
        parent_forum: Some(forum.clone()),
        parent_thread: Some(at.thread.clone()),
        uid: me.clone(),
        content: content.to_string(),
        created_time: time,
        updated_time: Some(time),
        updated_by: None,
        reactions: Default::default(),
        unread_by: Default::default(),
    };
    let post_id = PostId::from(store_ext::add_record(store, &at.posts(), &post).await?);
    let thread = Thread {
        id: at.thread.clone(),
        forum_id: forum.clone(),
        title: title.to_string(),
        priority: 0,
        created_by: me.clone(),
        created_time: time,
        updated_by: me.clone(),
        updated_time: time,
        post_ids: vec![post_id.clone()],
        post_count: 1,
        unread_by: Default::default(),
        is_sticky: false,
    };
    if let Err(err) = store_ext::set_record(store, &at.path(), &thread).await {
        tracing::warn!(?err, thread = %at, "failed creating thread, dropping its first post");
        if let Err(err) = store_ext::delete(store, &at.post(post_id).path()).await {
            tracing::warn!(?err, thread = %at, "failed dropping orphan post");
        }
        return Err(err);
    }
    session
        .aggregates
        .replay(vec![AggregateOp::PropagateTimestamp {
            target: DocPath::forum(forum),
            time,
            by: me.clone(),
        }])
        .await;
    tracing::debug!(thread = %at, "created thread");
    Ok(at)
}

/// One page of a live thread
pub struct ThreadView {
    session: Session,
    at: ThreadRef,
    sub: Option<Subscription>,
    thread: Option<Arc<Thread>>,
    page: PageRequest,
    editing: Option<PostId>,
    deleted: bool,
}

impl ThreadView {
    pub async fn open(
        session: &Session,
        at: ThreadRef,
        page: PageRequest,
    ) -> Result<ThreadView, Error> {
        let sub = Subscription::watch(session.store.clone(), Watch::Document(at.path())).await?;
        Ok(ThreadView {
            session: session.clone(),
            at,
            sub: Some(sub),
            thread: None,
            page,
            editing: None,
            deleted: false,
        })
    }

    pub fn at(&self) -> &ThreadRef {
        &self.at
    }

    pub fn thread(&self) -> Option<&Arc<Thread>> {
        self.thread.as_ref()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// Waits for the next state of the thread; None once it is gone or the view released
    pub async fn next_update(&mut self) -> Option<Arc<Thread>> {
        let snap = self.sub.as_mut()?.next().await?;
        let thread = match snap.single() {
            None => None,
            Some((id, doc)) => match Thread::from_document(id, doc.clone()) {
                Ok(t) => Some(t),
                Err(err) => {
                    tracing::warn!(?err, thread = %self.at, "ignoring malformed thread snapshot");
                    return self.thread.clone();
                }
            },
        };
        self.session
            .update_db(|db| db.replace_thread(&self.at, thread.clone()));
        match thread {
            Some(t) => {
                self.thread = Some(Arc::new(t));
                self.thread.clone()
            }
            None => {
                tracing::debug!(thread = %self.at, "thread went away");
                self.thread = None;
                self.deleted = true;
                self.sub = None;
                None
            }
        }
    }

    pub fn page_request(&self) -> PageRequest {
        self.page
    }

    pub fn set_page(&mut self, page: PageRequest) {
        self.page = page;
    }

    /// Current window, always computed from the latest known `postIds`
    pub fn window(&self) -> Page<PostId> {
        let ids = self
            .thread
            .as_ref()
            .map(|t| &t.post_ids as &[PostId])
            .unwrap_or(&[]);
        self.page.apply(ids)
    }

    pub async fn open_post(&self, post: PostId) -> Result<PostMachine, Error> {
        PostMachine::open(&self.session, self.at.post(post)).await
    }

    /// At most one post of the view is edited at a time
    pub fn claim_editing(&mut self, post: &PostId) -> bool {
        match &self.editing {
            Some(current) => current == post,
            None => {
                self.editing = Some(post.clone());
                true
            }
        }
    }

    pub fn release_editing(&mut self, post: &PostId) {
        if self.editing.as_ref() == Some(post) {
            self.editing = None;
        }
    }

    /// Whether actions on `post` are disabled because another post is being edited
    pub fn is_disabled(&self, post: &PostId) -> bool {
        self.editing.as_ref().map_or(false, |e| e != post)
    }

    /// Text prepended to a reply quoting `post`
    pub fn quote(post: &Post) -> String {
        format!("[quote uid={}]{}[/quote]\n", post.uid, post.content)
    }

    /// Adds a post at the end of the thread
    ///
    /// Only the post creation and its insertion in `postIds` can fail the
    /// submission; the other aggregate updates and the unread marks are
    /// logged when they fail.
    pub async fn submit_post(&self, content: &str) -> Result<PostId, Error> {
        Post::validate_content(content)?;
        let store = &*self.session.store;
        let me = &self.session.viewer.uid;
        let time = now();
        let post = Post {
            id: PostId::default(),
            parent_forum: Some(self.at.forum.clone()),
            parent_thread: Some(self.at.thread.clone()),
            uid: me.clone(),
            content: content.to_string(),
            created_time: time,
            updated_time: Some(time),
            updated_by: None,
            reactions: Default::default(),
            unread_by: Default::default(),
        };
        let id = PostId::from(store_ext::add_record(store, &self.at.posts(), &post).await?);
        if let Err(err) = self.session.aggregates.post_added(&self.at, &id, time, me).await {
            tracing::warn!(?err, thread = %self.at, "failed listing new post, dropping it");
            if let Err(err) = store_ext::delete(store, &self.at.post(id).path()).await {
                tracing::warn!(?err, thread = %self.at, "failed dropping orphan post");
            }
            return Err(err);
        }
        match self.session.read.participants(&self.at).await {
            Ok(participants) => {
                self.session
                    .read
                    .mark_unread(me, &self.at.post(id.clone()), participants)
                    .await;
            }
            Err(err) => tracing::warn!(?err, thread = %self.at, "failed listing participants"),
        }
        Ok(id)
    }

    /// Marks the last post of the current window read, along with the thread and forum
    pub async fn mark_page_read(&self) -> Vec<Error> {
        let window = self.window();
        let last = match window.window.last() {
            Some(last) => last.clone(),
            None => return Vec::new(),
        };
        self.session
            .read
            .mark_post_read(&self.session.viewer.uid, &self.at.post(last))
            .await
            .into_iter()
            .map(|(_, e)| e)
            .collect()
    }

    /// Deletes the thread and all its posts; reserved to admins
    pub async fn delete_thread(&mut self) -> Result<(), Error> {
        if !self.session.viewer.is_admin() {
            return Err(Error::PermissionDenied);
        }
        self.sub = None;
        match self.session.aggregates.delete_thread(&self.at).await {
            Ok(_) => {
                self.thread = None;
                self.deleted = true;
                self.session.update_db(|db| db.replace_thread(&self.at, None));
                Ok(())
            }
            Err(err) => {
                tracing::warn!(?err, thread = %self.at, "failed deleting thread");
                let watch = Watch::Document(self.at.path());
                self.sub = Some(Subscription::watch(self.session.store.clone(), watch).await?);
                Err(err)
            }
        }
    }
}
