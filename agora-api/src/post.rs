use std::collections::{BTreeMap, BTreeSet};

use crate::{DocPath, Error, ForumId, Record, ThreadId, ThreadRef, Time, UserId};

string_id!(PostId);
string_id!(ReactionKind);

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    #[serde(skip)]
    pub id: PostId,

    // Both are missing from some documents of the legacy flat layout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_forum: Option<ForumId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_thread: Option<ThreadId>,

    /// Author
    pub uid: UserId,
    pub content: String,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_time: Time,
    #[serde(
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_time: Option<Time>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<UserId>,

    #[serde(default)]
    pub reactions: BTreeMap<ReactionKind, BTreeSet<UserId>>,

    #[serde(default)]
    pub unread_by: BTreeSet<UserId>,
}

/// Location of a post in the tree layout
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct PostRef {
    pub thread: ThreadRef,
    pub post: PostId,
}

impl PostRef {
    pub fn path(&self) -> DocPath {
        DocPath::post(&self.thread.forum, &self.thread.thread, &self.post)
    }

    pub fn forum(&self) -> &ForumId {
        &self.thread.forum
    }
}

impl std::fmt::Display for PostRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.thread, self.post)
    }
}

impl Record for Post {
    fn set_id(&mut self, id: &str) {
        self.id = PostId::from(id);
    }
}

impl Post {
    /// Time and author of the latest creation-or-edit of this post
    pub fn last_activity(&self) -> (Time, UserId) {
        match (self.updated_time, &self.updated_by) {
            (Some(time), Some(by)) => (time, by.clone()),
            (Some(time), None) => (time, self.uid.clone()),
            (None, _) => (self.created_time, self.uid.clone()),
        }
    }

    /// Reaction currently held by `uid`, if any
    pub fn reaction_of(&self, uid: &UserId) -> Option<&ReactionKind> {
        self.reactions
            .iter()
            .find(|(_, uids)| uids.contains(uid))
            .map(|(kind, _)| kind)
    }

    pub fn validate_content(content: &str) -> Result<(), Error> {
        crate::validate_string(content)
    }
}
