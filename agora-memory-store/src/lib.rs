use std::{
    cmp::Ordering,
    collections::{BTreeMap, HashMap},
};

use agora_api::{
    CollectionPath, DocPath, Document, Error, FieldUpdate, Query, Snapshot, SnapshotStream,
    Store, Watch, WatchId,
};
use async_trait::async_trait;
use futures::{channel::mpsc, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;

mod fields;
pub use fields::{apply_update, compare_values, get_field};

/// In-memory document store with live snapshot watches and failure injection.
///
/// Serves as the test double for the sync core, and as the offline engine of
/// `agora-ctl` over JSON dumps.
pub struct MemoryStore {
    inner: Mutex<Inner>,
    read_gate: tokio::sync::watch::Sender<bool>,
}

#[derive(Default)]
struct Inner {
    docs: BTreeMap<DocPath, Document>,
    watches: BTreeMap<WatchId, WatchState>,
    next_watch: u64,
    failures: Vec<Failure>,
    reads: HashMap<String, usize>,
}

struct WatchState {
    watch: Watch,
    seq: u64,
    last: Option<Vec<(String, Option<Document>)>>,
    sender: mpsc::UnboundedSender<Snapshot>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Access {
    Read,
    /// Any of `set`, `update`, `add` and `delete`
    Write,
    /// `update` only, leaving the other writes alone
    Update,
}

impl Access {
    fn covers(self, access: Access) -> bool {
        self == access || (self == Access::Write && access == Access::Update)
    }
}

struct Failure {
    prefix: String,
    access: Access,
    error: Error,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        let (read_gate, _) = tokio::sync::watch::channel(false);
        MemoryStore {
            inner: Mutex::new(Inner::default()),
            read_gate,
        }
    }

    /// Loads a `{ "path": document }` dump
    pub fn from_dump(dump: BTreeMap<String, Value>) -> Result<MemoryStore, Error> {
        let store = MemoryStore::new();
        {
            let mut inner = store.inner.lock();
            for (path, doc) in dump {
                let parsed = DocPath::parse(&path)
                    .ok_or_else(|| Error::InvalidArgument(format!("not a document path: {path}")))?;
                match doc {
                    Value::Object(doc) => {
                        inner.docs.insert(parsed, doc);
                    }
                    _ => return Err(Error::Malformed(format!("{path} is not an object"))),
                }
            }
        }
        Ok(store)
    }

    pub fn dump(&self) -> BTreeMap<String, Value> {
        self.inner
            .lock()
            .docs
            .iter()
            .map(|(p, d)| (p.to_string(), Value::Object(d.clone())))
            .collect()
    }

    /// Makes every access of kind `access` to paths starting with `prefix` fail with `error`
    pub fn fail(&self, prefix: &str, access: Access, error: Error) {
        self.inner.lock().failures.push(Failure {
            prefix: prefix.to_string(),
            access,
            error,
        });
    }

    pub fn clear_failures(&self) {
        self.inner.lock().failures.clear();
    }

    /// Number of `get` calls issued for `path`
    pub fn reads_of(&self, path: &DocPath) -> usize {
        self.inner
            .lock()
            .reads
            .get(path.as_str())
            .copied()
            .unwrap_or(0)
    }

    /// Blocks `get` calls until `release_reads`, to observe concurrent fetches
    pub fn hold_reads(&self) {
        self.read_gate.send_replace(true);
    }

    pub fn release_reads(&self) {
        self.read_gate.send_replace(false);
    }

    pub fn contains(&self, path: &DocPath) -> bool {
        self.inner.lock().docs.contains_key(path)
    }

    pub fn doc(&self, path: &DocPath) -> Option<Document> {
        self.inner.lock().docs.get(path).cloned()
    }

    pub fn num_docs(&self) -> usize {
        self.inner.lock().docs.len()
    }

    pub fn num_watches(&self) -> usize {
        self.inner.lock().watches.len()
    }
}

impl Default for MemoryStore {
    fn default() -> MemoryStore {
        MemoryStore::new()
    }
}

impl Inner {
    fn check(&self, path: &str, access: Access) -> Result<(), Error> {
        match self
            .failures
            .iter()
            .find(|f| f.access.covers(access) && path.starts_with(&f.prefix))
        {
            Some(f) => Err(f.error.clone()),
            None => Ok(()),
        }
    }

    fn list(&self, collection: &CollectionPath) -> Vec<(String, Document)> {
        self.docs
            .iter()
            .filter(|(p, _)| collection.contains(p))
            .map(|(p, d)| (p.id().to_string(), d.clone()))
            .collect()
    }

    fn evaluate(&self, watch: &Watch) -> Vec<(String, Option<Document>)> {
        match watch {
            Watch::Document(path) => vec![(path.id().to_string(), self.docs.get(path).cloned())],
            Watch::Query(q) => run_query(self.list(&q.collection), q)
                .into_iter()
                .map(|(id, d)| (id, Some(d)))
                .collect(),
        }
    }

    /// Pushes a new snapshot to every watch whose result set changed
    fn notify(&mut self) {
        let mut results = Vec::with_capacity(self.watches.len());
        for (id, w) in self.watches.iter() {
            let res = self.evaluate(&w.watch);
            if w.last.as_ref() != Some(&res) {
                results.push((*id, res));
            }
        }
        for (id, res) in results {
            let mut closed = false;
            if let Some(w) = self.watches.get_mut(&id) {
                w.seq += 1;
                let snap = Snapshot {
                    seq: w.seq,
                    docs: res.clone(),
                };
                w.last = Some(res);
                closed = w.sender.unbounded_send(snap).is_err();
            }
            if closed {
                tracing::debug!(?id, "dropping watch whose receiver went away");
                self.watches.remove(&id);
            }
        }
    }
}

fn run_query(docs: Vec<(String, Document)>, q: &Query) -> Vec<(String, Document)> {
    let mut res = docs
        .into_iter()
        .filter(|(_, d)| {
            q.filters
                .iter()
                .all(|f| get_field(d, &f.field) == Some(&f.equals))
        })
        // documents lacking an ordering field are excluded from ordered queries
        .filter(|(_, d)| q.order_by.iter().all(|o| get_field(d, &o.field).is_some()))
        .collect::<Vec<_>>();
    res.sort_by(|(id_a, a), (id_b, b)| {
        for o in q.order_by.iter() {
            let (va, vb) = (get_field(a, &o.field), get_field(b, &o.field));
            let ord = match (va, vb) {
                (Some(va), Some(vb)) => compare_values(va, vb),
                _ => Ordering::Equal,
            };
            let ord = match o.direction {
                agora_api::Direction::Asc => ord,
                agora_api::Direction::Desc => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        id_a.cmp(id_b)
    });
    res
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, path: &DocPath) -> Result<Option<Document>, Error> {
        *self
            .inner
            .lock()
            .reads
            .entry(path.to_string())
            .or_insert(0) += 1;
        let mut gate = self.read_gate.subscribe();
        gate.wait_for(|held| !*held).await.map(|_| ()).ok();
        let inner = self.inner.lock();
        inner.check(path.as_str(), Access::Read)?;
        Ok(inner.docs.get(path).cloned())
    }

    async fn list(&self, collection: &CollectionPath) -> Result<Vec<(String, Document)>, Error> {
        let inner = self.inner.lock();
        inner.check(collection.as_str(), Access::Read)?;
        Ok(inner.list(collection))
    }

    async fn subscribe(&self, watch: Watch) -> Result<(WatchId, SnapshotStream), Error> {
        let mut inner = self.inner.lock();
        let path = match &watch {
            Watch::Document(p) => p.to_string(),
            Watch::Query(q) => q.collection.to_string(),
        };
        inner.check(&path, Access::Read)?;
        let (sender, receiver) = mpsc::unbounded();
        inner.next_watch += 1;
        let id = WatchId(inner.next_watch);
        inner.watches.insert(
            id,
            WatchState {
                watch,
                seq: 0,
                last: None,
                sender,
            },
        );
        inner.notify();
        Ok((id, receiver.boxed()))
    }

    fn unsubscribe(&self, id: WatchId) {
        self.inner.lock().watches.remove(&id);
    }

    async fn set(&self, path: &DocPath, doc: Document) -> Result<(), Error> {
        let mut inner = self.inner.lock();
        inner.check(path.as_str(), Access::Write)?;
        inner.docs.insert(path.clone(), doc);
        inner.notify();
        Ok(())
    }

    async fn update(&self, path: &DocPath, updates: Vec<FieldUpdate>) -> Result<(), Error> {
        let mut inner = self.inner.lock();
        inner.check(path.as_str(), Access::Update)?;
        let mut doc = inner
            .docs
            .get(path)
            .cloned()
            .ok_or_else(|| Error::NotFound(path.to_string()))?;
        // all field updates of one call apply atomically
        for u in updates {
            apply_update(&mut doc, u)?;
        }
        inner.docs.insert(path.clone(), doc);
        inner.notify();
        Ok(())
    }

    async fn add(&self, collection: &CollectionPath, doc: Document) -> Result<String, Error> {
        let mut inner = self.inner.lock();
        inner.check(collection.as_str(), Access::Write)?;
        let id = agora_api::new_doc_id();
        inner.docs.insert(collection.doc(&id), doc);
        inner.notify();
        Ok(id)
    }

    async fn delete(&self, path: &DocPath) -> Result<(), Error> {
        let mut inner = self.inner.lock();
        inner.check(path.as_str(), Access::Write)?;
        inner.docs.remove(path);
        inner.notify();
        Ok(())
    }
}
