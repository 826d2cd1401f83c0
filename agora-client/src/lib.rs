mod admin;
pub use admin::Admin;

pub mod aggregate;
pub use aggregate::{AggregateOp, Aggregates, FailedOp};

mod config;
pub use config::{Config, POSTS_PER_PAGE_VAR, RECOUNT_ON_REMOVE_VAR};

mod db;
pub use db::SessionDb;

pub mod migration;
pub use migration::{migrate_to_tree, MigrationReport};

pub mod pagination;
pub use pagination::{page, Page, PageRequest};

mod post_machine;
pub use post_machine::{PostMachine, PostState};

pub mod reaction;
pub use reaction::Reactions;

pub mod read_tracking;
pub use read_tracking::{Mutes, ReadTracker, Scope};

mod session;
pub use session::Session;

pub mod store_ext;

mod subscription;
pub use subscription::{CancelHandle, Subscription};

mod user_cache;
pub use user_cache::UserCache;

mod view;
pub use view::{create_thread, ForumListView, ThreadListView, ThreadView};

#[cfg(test)]
mod test_util;

pub mod api {
    pub use agora_api::*;
}
