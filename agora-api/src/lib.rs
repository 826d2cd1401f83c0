use chrono::Utc;

pub use uuid::Uuid;
pub type Time = chrono::DateTime<Utc>;

/// Document ids are opaque strings chosen by the store (or by `new_doc_id`)
macro_rules! string_id {
    ($name:ident) => {
        #[derive(
            Clone,
            Debug,
            Default,
            Eq,
            Hash,
            Ord,
            PartialEq,
            PartialOrd,
            serde::Deserialize,
            serde::Serialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> $name {
                $name(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> $name {
                $name(s)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

mod auth;
pub use auth::{AuthUser, Claim, Claims, UserSummary, Viewer};

mod document;
pub use document::{
    Direction, Document, FieldOp, FieldUpdate, Filter, OrderBy, Query, Record, Snapshot, Watch,
    WatchId,
};

mod error;
pub use error::Error;

mod forum;
pub use forum::{Forum, ForumId};

mod invite;
pub use invite::{Invite, InviteId};

mod path;
pub use path::{CollectionPath, DocPath};

mod post;
pub use post::{Post, PostId, PostRef, ReactionKind};

mod store;
pub use store::{Identity, RoleService, SnapshotStream, Store};

mod thread;
pub use thread::{Thread, ThreadId, ThreadRef};

mod user;
pub use user::{UserId, UserProfile};

/// Generates a fresh document id, for documents whose id must be known before they are written
pub fn new_doc_id() -> String {
    Uuid::new_v4().simple().to_string()
}

// Strings containing null bytes are rejected by the backing stores
pub fn validate_string(s: &str) -> Result<(), Error> {
    if s.contains('\0') {
        return Err(Error::InvalidArgument(format!(
            "null byte in string is not allowed: {s:?}"
        )));
    }
    Ok(())
}

/// Milliseconds since the epoch, the on-the-wire encoding of every timestamp
pub fn time_to_millis(t: &Time) -> i64 {
    t.timestamp_millis()
}

/// Current time, truncated to what the wire encoding can carry
pub fn now() -> Time {
    let now = Utc::now();
    millis_to_time(time_to_millis(&now)).unwrap_or(now)
}

pub fn millis_to_time(ms: i64) -> Option<Time> {
    use chrono::TimeZone;
    Utc.timestamp_millis_opt(ms).single()
}

/// Picks the most recent item, an equal timestamp later in the iteration winning
pub fn most_recent<T>(items: impl IntoIterator<Item = (Time, T)>) -> Option<T> {
    let mut best: Option<(Time, T)> = None;
    for (time, item) in items {
        match &best {
            Some((best_time, _)) if *best_time > time => (),
            _ => best = Some((time, item)),
        }
    }
    best.map(|(_, item)| item)
}
