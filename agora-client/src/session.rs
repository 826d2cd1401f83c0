use std::sync::Arc;

use parking_lot::Mutex;

use crate::{
    api::{Error, Identity, Store, Viewer},
    Aggregates, Config, ReadTracker, Reactions, SessionDb, UserCache,
};

/// Everything a signed-in user's views share for the lifetime of a session
#[derive(Clone)]
pub struct Session {
    pub store: Arc<dyn Store>,
    pub config: Config,
    pub viewer: Viewer,
    pub users: Arc<UserCache>,
    pub aggregates: Arc<Aggregates>,
    pub read: Arc<ReadTracker>,
    pub reactions: Arc<Reactions>,
    db: Arc<Mutex<SessionDb>>,
}

impl Session {
    pub fn new(store: Arc<dyn Store>, config: Config, viewer: Viewer) -> Session {
        Session {
            users: Arc::new(UserCache::new(store.clone())),
            aggregates: Arc::new(Aggregates::new(store.clone(), config.clone())),
            read: Arc::new(ReadTracker::new(store.clone())),
            reactions: Arc::new(Reactions::new(store.clone())),
            db: Arc::new(Mutex::new(SessionDb::default())),
            store,
            config,
            viewer,
        }
    }

    /// Current state of the mirrors
    pub fn db(&self) -> SessionDb {
        self.db.lock().clone()
    }

    pub(crate) fn update_db(&self, f: impl FnOnce(&mut SessionDb)) {
        f(&mut self.db.lock())
    }

    /// Opens a session for the user currently signed in with `identity`
    pub async fn sign_in(
        store: Arc<dyn Store>,
        config: Config,
        identity: &dyn Identity,
    ) -> Result<Session, Error> {
        let user = identity.current_user().ok_or(Error::PermissionDenied)?;
        let claims = identity.claims().await?;
        if claims.banned {
            tracing::info!(uid = %user.uid, "refusing session of banned user");
            return Err(Error::PermissionDenied);
        }
        tracing::debug!(uid = %user.uid, ?claims, "opening session");
        Ok(Session::new(store, config, Viewer::new(user.uid, claims)))
    }
}
