use std::sync::Arc;

use crate::{
    api::{Error, FieldUpdate, Post, PostRef, ReactionKind, Store, UserId},
    store_ext,
};

fn field(kind: &ReactionKind) -> String {
    format!("reactions.{kind}")
}

/// Adds or removes `uid` from the reaction set of `kind`; a single idempotent write
pub async fn toggle(
    store: &dyn Store,
    post: &PostRef,
    kind: &ReactionKind,
    uid: &UserId,
    add: bool,
) -> Result<(), Error> {
    let value = vec![uid.as_str().into()];
    let update = match add {
        true => FieldUpdate::array_union(field(kind), value),
        false => FieldUpdate::array_remove(field(kind), value),
    };
    store_ext::update(store, &post.path(), vec![update]).await
}

/// Reaction `uid` currently holds on `post`, if any
pub fn current_reaction<'a>(post: &'a Post, uid: &UserId) -> Option<&'a ReactionKind> {
    post.reaction_of(uid)
}

/// Per-post reaction control, holding at most one reaction per user
pub struct Reactions {
    store: Arc<dyn Store>,
}

impl Reactions {
    pub fn new(store: Arc<dyn Store>) -> Reactions {
        Reactions { store }
    }

    /// Reacts with `kind` as `uid` on the last known state `post`
    ///
    /// Clicking the reaction already held removes it. Clicking another one
    /// removes the held reaction then adds the new one, as two separate writes.
    pub async fn click(
        &self,
        post: &Post,
        at: &PostRef,
        kind: &ReactionKind,
        uid: &UserId,
    ) -> Result<(), Error> {
        match current_reaction(post, uid) {
            Some(current) if current == kind => toggle(&*self.store, at, kind, uid, false).await,
            Some(current) => {
                toggle(&*self.store, at, current, uid, false).await?;
                toggle(&*self.store, at, kind, uid, true).await
            }
            None => toggle(&*self.store, at, kind, uid, true).await,
        }
    }
}
