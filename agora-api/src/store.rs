use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::{
    AuthUser, Claim, Claims, CollectionPath, DocPath, Document, Error, FieldUpdate, Snapshot,
    UserId, UserSummary, Watch, WatchId,
};

pub type SnapshotStream = BoxStream<'static, Snapshot>;

/// Remote document store. Offers no multi-document transaction.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get(&self, path: &DocPath) -> Result<Option<Document>, Error>;

    async fn list(&self, collection: &CollectionPath) -> Result<Vec<(String, Document)>, Error>;

    /// Starts a live watch. The stream yields an initial snapshot, then one per change.
    async fn subscribe(&self, watch: Watch) -> Result<(WatchId, SnapshotStream), Error>;

    /// Idempotent; must be callable from synchronous teardown code
    fn unsubscribe(&self, id: WatchId);

    async fn set(&self, path: &DocPath, doc: Document) -> Result<(), Error>;

    /// Fails with `Error::NotFound` if the document does not exist
    async fn update(&self, path: &DocPath, updates: Vec<FieldUpdate>) -> Result<(), Error>;

    /// Returns the generated id of the new document
    async fn add(&self, collection: &CollectionPath, doc: Document) -> Result<String, Error>;

    /// Deleting an absent document succeeds
    async fn delete(&self, path: &DocPath) -> Result<(), Error>;
}

/// Privileged server-side procedures, opaque to the core
#[async_trait]
pub trait RoleService: Send + Sync {
    async fn set_banned(&self, uid: &UserId, is_on: bool) -> Result<(), Error>;
    async fn set_claim(&self, claim: Claim, uid: &UserId, is_on: bool) -> Result<(), Error>;
    async fn get_all_users(&self, get_all: bool) -> Result<Vec<UserSummary>, Error>;
    async fn check_if_banned(&self) -> Result<bool, Error>;
    async fn process_invite_code(
        &self,
        user: &AuthUser,
        code: &str,
        should_create: bool,
    ) -> Result<(), Error>;
    async fn set_avatar(&self, uid: &UserId, url: &str) -> Result<(), Error>;
}

#[async_trait]
pub trait Identity: Send + Sync {
    fn current_user(&self) -> Option<AuthUser>;
    async fn claims(&self) -> Result<Claims, Error>;
}
