use std::fmt;

use crate::{ForumId, InviteId, PostId, ThreadId, UserId};

const LEGACY_ROOTS: [&str; 2] = ["threads", "posts"];

/// Key path of a single document, eg. `forums/{forumId}/threads/{threadId}`
#[derive(
    Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
#[serde(transparent)]
pub struct DocPath(String);

/// Key path of a collection, eg. `forums/{forumId}/threads`
#[derive(
    Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
#[serde(transparent)]
pub struct CollectionPath(String);

impl DocPath {
    /// Returns None if `path` does not have an even, non-zero number of segments
    pub fn parse(path: &str) -> Option<DocPath> {
        let segments = path.split('/').collect::<Vec<_>>();
        if segments.len() % 2 != 0 || segments.iter().any(|s| s.is_empty()) {
            return None;
        }
        Some(DocPath(path.to_string()))
    }

    pub fn forum(forum: &ForumId) -> DocPath {
        CollectionPath::forums().doc(&forum.0)
    }

    pub fn thread(forum: &ForumId, thread: &ThreadId) -> DocPath {
        CollectionPath::threads(forum).doc(&thread.0)
    }

    pub fn post(forum: &ForumId, thread: &ThreadId, post: &PostId) -> DocPath {
        CollectionPath::posts(forum, thread).doc(&post.0)
    }

    /// Private user document, holding eg. notification settings
    pub fn user(uid: &UserId) -> DocPath {
        CollectionPath::users().doc(&uid.0)
    }

    pub fn user_public(uid: &UserId) -> DocPath {
        CollectionPath::users_public().doc(&uid.0)
    }

    pub fn invite(invite: &InviteId) -> DocPath {
        CollectionPath::invites().doc(&invite.0)
    }

    pub fn legacy_thread(thread: &ThreadId) -> DocPath {
        CollectionPath::legacy_threads().doc(&thread.0)
    }

    pub fn legacy_post(post: &PostId) -> DocPath {
        CollectionPath::legacy_posts().doc(&post.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last segment of the path
    pub fn id(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    pub fn parent(&self) -> CollectionPath {
        match self.0.rsplit_once('/') {
            Some((parent, _)) => CollectionPath(parent.to_string()),
            None => CollectionPath(String::new()),
        }
    }

    pub fn collection(&self, name: &str) -> CollectionPath {
        CollectionPath(format!("{}/{}", self.0, name))
    }

    /// Legacy flat-layout documents may be read for migration but never written
    pub fn is_legacy(&self) -> bool {
        self.parent().is_legacy()
    }
}

impl CollectionPath {
    pub fn parse(path: &str) -> Option<CollectionPath> {
        let segments = path.split('/').collect::<Vec<_>>();
        if segments.len() % 2 != 1 || segments.iter().any(|s| s.is_empty()) {
            return None;
        }
        Some(CollectionPath(path.to_string()))
    }

    pub fn forums() -> CollectionPath {
        CollectionPath(String::from("forums"))
    }

    pub fn threads(forum: &ForumId) -> CollectionPath {
        DocPath::forum(forum).collection("threads")
    }

    pub fn posts(forum: &ForumId, thread: &ThreadId) -> CollectionPath {
        DocPath::thread(forum, thread).collection("posts")
    }

    pub fn users() -> CollectionPath {
        CollectionPath(String::from("users"))
    }

    pub fn users_public() -> CollectionPath {
        CollectionPath(String::from("usersPublic"))
    }

    pub fn invites() -> CollectionPath {
        CollectionPath(String::from("invites"))
    }

    pub fn legacy_threads() -> CollectionPath {
        CollectionPath(String::from("threads"))
    }

    pub fn legacy_posts() -> CollectionPath {
        CollectionPath(String::from("posts"))
    }

    pub fn doc(&self, id: &str) -> DocPath {
        DocPath(format!("{}/{}", self.0, id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Document owning this subcollection, if it is not a root collection
    pub fn parent_doc(&self) -> Option<DocPath> {
        self.0
            .rsplit_once('/')
            .map(|(parent, _)| DocPath(parent.to_string()))
    }

    /// Whether `doc` is a direct child of this collection
    pub fn contains(&self, doc: &DocPath) -> bool {
        doc.parent() == *self
    }

    pub fn is_legacy(&self) -> bool {
        LEGACY_ROOTS.contains(&self.0.as_str())
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
