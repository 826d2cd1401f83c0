use std::sync::Arc;

use futures::future;

use crate::{
    api::{
        most_recent, CollectionPath, DocPath, Error, FieldUpdate, ForumId, Post, PostId, Store,
        Thread, ThreadId, ThreadRef, Time, UserId,
    },
    store_ext, Config,
};

/// One reconciliation step over the denormalized aggregates
///
/// Each step is idempotent on its own, so any subset of a failed sequence can
/// be replayed in any order.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AggregateOp {
    /// Adds `post` to the thread's `postIds`, and points the thread at it
    AppendChild {
        thread: ThreadRef,
        post: PostId,
        time: Time,
        by: UserId,
    },
    /// Sets `postCount` to the number of documents in the thread's post collection
    Recount { thread: ThreadRef },
    /// Sets `updatedTime/updatedBy` of `target`
    PropagateTimestamp {
        target: DocPath,
        time: Time,
        by: UserId,
    },
    RemoveChild { thread: ThreadRef, post: PostId },
    /// Points the thread at the last post of its current `postIds`
    RederiveThread { thread: ThreadRef },
    /// Deletes the thread along with every post left in its collection
    DeleteThread { thread: ThreadRef },
    /// Points the forum at its most recently updated remaining thread
    RederiveForum { forum: ForumId },
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FailedOp {
    pub op: AggregateOp,
    pub error: Error,
}

pub struct Aggregates {
    store: Arc<dyn Store>,
    config: Config,
}

impl Aggregates {
    pub fn new(store: Arc<dyn Store>, config: Config) -> Aggregates {
        Aggregates { store, config }
    }

    pub async fn apply(&self, op: &AggregateOp) -> Result<(), Error> {
        let store = &*self.store;
        match op {
            AggregateOp::AppendChild {
                thread,
                post,
                time,
                by,
            } => {
                store_ext::update(
                    store,
                    &thread.path(),
                    vec![
                        FieldUpdate::array_union("postIds", vec![post.as_str().into()]),
                        FieldUpdate::set_time("updatedTime", time),
                        FieldUpdate::set("updatedBy", by.as_str()),
                    ],
                )
                .await
            }
            AggregateOp::Recount { thread } => {
                let count = store.list(&thread.posts()).await?.len();
                let updates = vec![FieldUpdate::set("postCount", count)];
                store_ext::update(store, &thread.path(), updates).await
            }
            AggregateOp::PropagateTimestamp { target, time, by } => {
                store_ext::update(store, target, timestamp_updates(time, by)).await
            }
            AggregateOp::RemoveChild { thread, post } => {
                store_ext::update(
                    store,
                    &thread.path(),
                    vec![FieldUpdate::array_remove("postIds", vec![post.as_str().into()])],
                )
                .await
            }
            AggregateOp::RederiveThread { thread } => {
                let t = store_ext::get_record::<Thread>(store, &thread.path())
                    .await?
                    .ok_or_else(|| Error::NotFound(thread.path().to_string()))?;
                // Only the new last element is considered, not the true most recent post
                let last = match t.last_post() {
                    Some(last) => thread.post(last.clone()),
                    None => return Ok(()),
                };
                let post = store_ext::get_record::<Post>(store, &last.path())
                    .await?
                    .ok_or_else(|| Error::NotFound(last.path().to_string()))?;
                let (time, by) = post.last_activity();
                store_ext::update(store, &thread.path(), timestamp_updates(&time, &by)).await
            }
            AggregateOp::DeleteThread { thread } => {
                let posts = store.list(&thread.posts()).await?;
                let deletions = posts
                    .iter()
                    .map(|(id, _)| thread.post(PostId::from(id.as_str())).path())
                    .collect::<Vec<_>>();
                future::try_join_all(deletions.iter().map(|p| store_ext::delete(store, p))).await?;
                store_ext::delete(store, &thread.path()).await
            }
            AggregateOp::RederiveForum { forum } => {
                let threads = store_ext::list_records::<Thread>(
                    store,
                    &CollectionPath::threads(forum),
                )
                .await?;
                let updates = match most_recent(threads.into_iter().map(|t| (t.updated_time, t))) {
                    Some(t) => timestamp_updates(&t.updated_time, &t.updated_by),
                    None => vec![
                        FieldUpdate::delete("updatedTime"),
                        FieldUpdate::delete("updatedBy"),
                    ],
                };
                store_ext::update(store, &DocPath::forum(forum), updates).await
            }
        }
    }

    /// Runs `primary`, then each secondary step, collecting the secondary failures
    ///
    /// Nothing is rolled back: a failed primary step aborts the sequence, a
    /// failed secondary step is logged and reported for replay.
    async fn run(
        &self,
        primary: AggregateOp,
        secondaries: Vec<AggregateOp>,
    ) -> Result<Vec<FailedOp>, Error> {
        if let Err(error) = self.apply(&primary).await {
            tracing::warn!(?error, op = ?primary, "aggregate primary step failed");
            return Err(error);
        }
        Ok(self.replay(secondaries).await)
    }

    /// Applies each step in order, returning those that failed
    ///
    /// A step failing with NotFound is considered done, its target being already gone.
    pub async fn replay(&self, ops: Vec<AggregateOp>) -> Vec<FailedOp> {
        let mut failed = Vec::new();
        for op in ops {
            match self.apply(&op).await {
                Ok(()) => (),
                Err(error) if error.is_not_found() => {
                    tracing::debug!(?error, ?op, "aggregate target already gone");
                }
                Err(error) => {
                    tracing::warn!(?error, ?op, "aggregate step failed, leaving it for replay");
                    failed.push(FailedOp { op, error });
                }
            }
        }
        failed
    }

    /// To be called once `post` was added to `thread`'s post collection
    pub async fn post_added(
        &self,
        thread: &ThreadRef,
        post: &PostId,
        time: Time,
        by: &UserId,
    ) -> Result<Vec<FailedOp>, Error> {
        self.run(
            AggregateOp::AppendChild {
                thread: thread.clone(),
                post: post.clone(),
                time,
                by: by.clone(),
            },
            vec![
                AggregateOp::Recount {
                    thread: thread.clone(),
                },
                AggregateOp::PropagateTimestamp {
                    target: DocPath::forum(&thread.forum),
                    time,
                    by: by.clone(),
                },
            ],
        )
        .await
    }

    /// To be called when `post` is removed from `thread`; deletes the thread if
    /// it was its only post
    ///
    /// `postCount` is left alone, as the post document may still be in the
    /// collection. Call `recount_after_removal` once its deletion completed.
    pub async fn post_removed(
        &self,
        thread: &ThreadRef,
        post: &PostId,
    ) -> Result<Vec<FailedOp>, Error> {
        let t = match store_ext::get_record::<Thread>(&*self.store, &thread.path()).await? {
            Some(t) => t,
            None => {
                tracing::debug!(%thread, %post, "thread already gone, nothing to remove from");
                return Ok(Vec::new());
            }
        };
        if t.is_only_post(post) || t.post_ids.is_empty() {
            return self.delete_thread(thread).await;
        }
        let was_last = t.last_post() == Some(post);
        let mut secondaries = Vec::new();
        if was_last {
            secondaries.push(AggregateOp::RederiveThread {
                thread: thread.clone(),
            });
        }
        self.run(
            AggregateOp::RemoveChild {
                thread: thread.clone(),
                post: post.clone(),
            },
            secondaries,
        )
        .await
    }

    /// Recounts `thread` once a removed post's document is gone, if configured to
    pub async fn recount_after_removal(&self, thread: &ThreadRef) -> Vec<FailedOp> {
        if !self.config.recount_on_remove {
            return Vec::new();
        }
        self.replay(vec![AggregateOp::Recount {
            thread: thread.clone(),
        }])
        .await
    }

    /// Re-derives every aggregate of `forum` from its current threads and posts
    pub async fn repair_forum(&self, forum: &ForumId) -> Result<Vec<FailedOp>, Error> {
        let threads = self.store.list(&CollectionPath::threads(forum)).await?;
        let mut ops = Vec::with_capacity(2 * threads.len() + 1);
        for (id, _) in threads {
            let thread = ThreadRef::new(forum.clone(), ThreadId::from(id));
            ops.push(AggregateOp::Recount {
                thread: thread.clone(),
            });
            ops.push(AggregateOp::RederiveThread { thread });
        }
        ops.push(AggregateOp::RederiveForum {
            forum: forum.clone(),
        });
        Ok(self.replay(ops).await)
    }

    pub async fn delete_thread(&self, thread: &ThreadRef) -> Result<Vec<FailedOp>, Error> {
        self.run(
            AggregateOp::DeleteThread {
                thread: thread.clone(),
            },
            vec![AggregateOp::RederiveForum {
                forum: thread.forum.clone(),
            }],
        )
        .await
    }
}

fn timestamp_updates(time: &Time, by: &UserId) -> Vec<FieldUpdate> {
    vec![
        FieldUpdate::set_time("updatedTime", time),
        FieldUpdate::set("updatedBy", by.as_str()),
    ]
}
