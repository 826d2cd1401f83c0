use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use futures::{
    future::{self, BoxFuture, Shared},
    FutureExt,
};
use parking_lot::Mutex;

use crate::api::{DocPath, Record, Store, UserId, UserProfile};

type Fetch = Shared<BoxFuture<'static, Option<UserProfile>>>;

/// Per-session memo of public user profiles
///
/// At most one fetch per uid is outstanding at any time; concurrent resolvers
/// of the same uid share it. Failed fetches are not cached, so a later
/// `resolve` retries.
pub struct UserCache {
    store: Arc<dyn Store>,
    inner: Mutex<Inner>,
}

struct Inner {
    profiles: Arc<HashMap<UserId, UserProfile>>,
    in_flight: HashMap<UserId, Fetch>,
}

impl UserCache {
    pub fn new(store: Arc<dyn Store>) -> UserCache {
        UserCache {
            store,
            inner: Mutex::new(Inner {
                profiles: Arc::new(HashMap::new()),
                in_flight: HashMap::new(),
            }),
        }
    }

    pub fn get(&self, uid: &UserId) -> Option<UserProfile> {
        self.inner.lock().profiles.get(uid).cloned()
    }

    /// Immutable view of every cached profile, unaffected by later merges
    pub fn snapshot(&self) -> Arc<HashMap<UserId, UserProfile>> {
        self.inner.lock().profiles.clone()
    }

    /// Adds or replaces the given profiles, never removing any other
    pub fn merge(&self, profiles: impl IntoIterator<Item = UserProfile>) {
        let mut inner = self.inner.lock();
        Arc::make_mut(&mut inner.profiles).extend(profiles.into_iter().map(|p| (p.uid.clone(), p)));
    }

    pub async fn resolve(&self, uid: &UserId) -> UserProfile {
        self.resolve_impl(uid, false).await
    }

    /// Fetches `uid` even if cached; keeps the cached profile if the fetch fails
    pub async fn refresh(&self, uid: &UserId) -> UserProfile {
        self.resolve_impl(uid, true).await
    }

    pub async fn resolve_many(
        &self,
        uids: impl IntoIterator<Item = UserId>,
    ) -> BTreeMap<UserId, UserProfile> {
        let mut res = BTreeMap::new();
        let mut missing = Vec::new();
        {
            let inner = self.inner.lock();
            for uid in uids {
                match inner.profiles.get(&uid) {
                    Some(p) => {
                        res.insert(uid, p.clone());
                    }
                    None => missing.push(uid),
                }
            }
        }
        missing.sort_unstable();
        missing.dedup();
        let fetched = future::join_all(missing.iter().map(|uid| self.resolve(uid))).await;
        res.extend(missing.into_iter().zip(fetched));
        res
    }

    async fn resolve_impl(&self, uid: &UserId, force: bool) -> UserProfile {
        let fetch = {
            let mut inner = self.inner.lock();
            if !force {
                if let Some(p) = inner.profiles.get(uid) {
                    return p.clone();
                }
            }
            match inner.in_flight.get(uid) {
                Some(f) => f.clone(),
                None => {
                    let f = fetch_profile(self.store.clone(), uid.clone());
                    inner.in_flight.insert(uid.clone(), f.clone());
                    f
                }
            }
        };
        let res = fetch.clone().await;
        let mut inner = self.inner.lock();
        if inner.in_flight.get(uid).map_or(false, |f| f.ptr_eq(&fetch)) {
            inner.in_flight.remove(uid);
        }
        match res {
            Some(p) => {
                Arc::make_mut(&mut inner.profiles).insert(uid.clone(), p.clone());
                p
            }
            None => inner
                .profiles
                .get(uid)
                .cloned()
                .unwrap_or_else(|| UserProfile::unknown(uid.clone())),
        }
    }
}

fn fetch_profile(store: Arc<dyn Store>, uid: UserId) -> Fetch {
    async move {
        let path = DocPath::user_public(&uid);
        match store.get(&path).await {
            Ok(Some(doc)) => match UserProfile::from_document(uid.as_str(), doc) {
                Ok(p) => Some(p),
                Err(err) => {
                    tracing::warn!(?err, %uid, "malformed user profile");
                    None
                }
            },
            Ok(None) => {
                tracing::warn!(%uid, "user profile does not exist");
                None
            }
            Err(err) => {
                tracing::warn!(?err, %uid, "failed fetching user profile");
                None
            }
        }
    }
    .boxed()
    .shared()
}
