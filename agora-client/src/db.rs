use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use crate::api::{Forum, ForumId, Thread, ThreadRef, UserId};

/// In-memory mirrors of the live collections a session watches
///
/// Cloning is cheap. Each mirror is only ever replaced as a whole from a
/// snapshot, so readers holding a clone keep seeing a consistent state.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SessionDb {
    pub forums: Arc<Vec<Forum>>,
    pub thread_lists: Arc<HashMap<ForumId, Arc<Vec<Thread>>>>,
    pub threads: Arc<HashMap<ThreadRef, Arc<Thread>>>,
}

impl SessionDb {
    pub fn replace_forums(&mut self, forums: Vec<Forum>) {
        self.forums = Arc::new(forums);
    }

    /// Replaces the thread list of `forum`, leaving the other forums' lists alone
    pub fn replace_thread_list(&mut self, forum: &ForumId, threads: Vec<Thread>) {
        Arc::make_mut(&mut self.thread_lists).insert(forum.clone(), Arc::new(threads));
    }

    /// Replaces, or forgets if `thread` is None, a single watched thread
    pub fn replace_thread(&mut self, at: &ThreadRef, thread: Option<Thread>) {
        let threads = Arc::make_mut(&mut self.threads);
        match thread {
            Some(t) => {
                threads.insert(at.clone(), Arc::new(t));
            }
            None => {
                threads.remove(at);
            }
        }
    }

    pub fn forum(&self, id: &ForumId) -> Option<&Forum> {
        self.forums.iter().find(|f| f.id == *id)
    }

    pub fn forum_names(&self) -> BTreeMap<ForumId, String> {
        self.forums
            .iter()
            .map(|f| (f.id.clone(), f.name.clone()))
            .collect()
    }

    pub fn thread_list(&self, forum: &ForumId) -> Option<Arc<Vec<Thread>>> {
        self.thread_lists.get(forum).cloned()
    }

    pub fn thread(&self, at: &ThreadRef) -> Option<Arc<Thread>> {
        self.threads.get(at).cloned()
    }

    pub fn unread_forums(&self, uid: &UserId) -> Vec<ForumId> {
        self.forums
            .iter()
            .filter(|f| f.is_unread_for(uid))
            .map(|f| f.id.clone())
            .collect()
    }
}
