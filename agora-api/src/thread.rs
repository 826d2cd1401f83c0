use std::collections::BTreeSet;

use crate::{CollectionPath, DocPath, ForumId, PostId, Record, Time, UserId};

string_id!(ThreadId);

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Thread {
    #[serde(skip)]
    pub id: ThreadId,

    pub forum_id: ForumId,
    pub title: String,

    /// Higher priorities are listed first, eg. pinned threads
    #[serde(default)]
    pub priority: i64,

    pub created_by: UserId,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_time: Time,

    pub updated_by: UserId,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_time: Time,

    /// Authoritative ordering, and membership, of this thread's posts
    #[serde(default)]
    pub post_ids: Vec<PostId>,

    /// Cached cardinality of the posts subcollection, converges towards its true size
    #[serde(default)]
    pub post_count: u64,

    #[serde(default)]
    pub unread_by: BTreeSet<UserId>,

    #[serde(default)]
    pub is_sticky: bool,
}

/// Location of a thread in the tree layout
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ThreadRef {
    pub forum: ForumId,
    pub thread: ThreadId,
}

impl ThreadRef {
    pub fn new(forum: ForumId, thread: ThreadId) -> ThreadRef {
        ThreadRef { forum, thread }
    }

    pub fn path(&self) -> DocPath {
        DocPath::thread(&self.forum, &self.thread)
    }

    pub fn posts(&self) -> CollectionPath {
        CollectionPath::posts(&self.forum, &self.thread)
    }

    pub fn post(&self, post: PostId) -> crate::PostRef {
        crate::PostRef {
            thread: self.clone(),
            post,
        }
    }
}

impl std::fmt::Display for ThreadRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.forum, self.thread)
    }
}

impl Record for Thread {
    fn set_id(&mut self, id: &str) {
        self.id = ThreadId::from(id);
    }
}

impl Thread {
    pub fn thread_ref(&self) -> ThreadRef {
        ThreadRef::new(self.forum_id.clone(), self.id.clone())
    }

    pub fn position(&self, post: &PostId) -> Option<usize> {
        self.post_ids.iter().position(|p| p == post)
    }

    pub fn is_only_post(&self, post: &PostId) -> bool {
        self.post_ids.len() == 1 && self.post_ids[0] == *post
    }

    pub fn last_post(&self) -> Option<&PostId> {
        self.post_ids.last()
    }

    pub fn is_unread_for(&self, uid: &UserId) -> bool {
        self.unread_by.contains(uid)
    }
}
