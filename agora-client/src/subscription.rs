use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use futures::StreamExt;

use crate::api::{Error, Record, Snapshot, SnapshotStream, Store, Watch, WatchId};

/// A live watch on the store, cancelled when dropped
///
/// Yields full snapshots in increasing `seq` order. Once cancelled, it never
/// yields again, not even a snapshot that was already in flight.
pub struct Subscription {
    handle: CancelHandle,
    stream: SnapshotStream,
    last_seq: Option<u64>,
}

/// Cancels a subscription from elsewhere than its owner
#[derive(Clone)]
pub struct CancelHandle {
    store: Arc<dyn Store>,
    id: WatchId,
    live: Arc<AtomicBool>,
}

impl CancelHandle {
    /// Immediate and idempotent
    pub fn cancel(&self) {
        if self.live.swap(false, Ordering::SeqCst) {
            tracing::trace!(id = ?self.id, "cancelling watch");
            self.store.unsubscribe(self.id);
        }
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }
}

impl Subscription {
    pub async fn watch(store: Arc<dyn Store>, watch: Watch) -> Result<Subscription, Error> {
        let (id, stream) = store.subscribe(watch).await?;
        Ok(Subscription::from_parts(store, id, stream))
    }

    pub(crate) fn from_parts(
        store: Arc<dyn Store>,
        id: WatchId,
        stream: SnapshotStream,
    ) -> Subscription {
        Subscription {
            handle: CancelHandle {
                store,
                id,
                live: Arc::new(AtomicBool::new(true)),
            },
            stream,
            last_seq: None,
        }
    }

    pub fn id(&self) -> WatchId {
        self.handle.id
    }

    pub fn handle(&self) -> CancelHandle {
        self.handle.clone()
    }

    pub fn cancel(&self) {
        self.handle.cancel()
    }

    pub fn is_live(&self) -> bool {
        self.handle.is_live()
    }

    /// Next snapshot newer than every one yielded so far, or None once cancelled
    pub async fn next(&mut self) -> Option<Snapshot> {
        loop {
            if !self.is_live() {
                return None;
            }
            let snap = self.stream.next().await?;
            if !self.is_live() {
                return None;
            }
            match self.last_seq {
                Some(last) if snap.seq <= last => {
                    tracing::debug!(
                        id = ?self.handle.id,
                        seq = snap.seq,
                        last,
                        "discarding stale snapshot"
                    );
                }
                _ => {
                    self.last_seq = Some(snap.seq);
                    return Some(snap);
                }
            }
        }
    }

    /// Next snapshot, decoded; malformed documents are logged and skipped
    pub async fn next_records<R: Record>(&mut self) -> Option<Vec<R>> {
        let snap = self.next().await?;
        let (records, errors) = snap.records();
        for err in errors {
            tracing::warn!(?err, id = ?self.handle.id, "skipping malformed document in snapshot");
        }
        Some(records)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.handle.cancel();
    }
}
