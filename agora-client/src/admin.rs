//! Administration over the role service, and invite listings
//!
//! Role-service failures are logged here; they never tear down the session.

use std::sync::Arc;

use futures::{
    future::{self, BoxFuture, Shared},
    FutureExt,
};
use parking_lot::Mutex;

use crate::{
    api::{
        AuthUser, Claim, CollectionPath, Error, Identity, Invite, RoleService, Store, UserId,
        UserProfile, UserSummary,
    },
    store_ext,
};

pub struct Admin {
    store: Arc<dyn Store>,
    roles: Arc<dyn RoleService>,
    identity: Arc<dyn Identity>,
    banned_check: Mutex<Option<Shared<BoxFuture<'static, bool>>>>,
}

fn logged<T>(what: &str, uid: &UserId, res: Result<T, Error>) -> Result<T, Error> {
    if let Err(err) = &res {
        tracing::warn!(?err, %uid, "{what} failed");
    }
    res
}

impl Admin {
    pub fn new(
        store: Arc<dyn Store>,
        roles: Arc<dyn RoleService>,
        identity: Arc<dyn Identity>,
    ) -> Admin {
        Admin {
            store,
            roles,
            identity,
            banned_check: Mutex::new(None),
        }
    }

    pub async fn set_banned(&self, uid: &UserId, banned: bool) -> Result<(), Error> {
        logged("ban", uid, self.roles.set_banned(uid, banned).await)
    }

    pub async fn set_moderator(&self, uid: &UserId, is_on: bool) -> Result<(), Error> {
        logged("mod toggle", uid, self.roles.set_claim(Claim::Mod, uid, is_on).await)
    }

    pub async fn set_validated(&self, uid: &UserId, is_on: bool) -> Result<(), Error> {
        logged("validation toggle", uid, self.roles.set_claim(Claim::Validated, uid, is_on).await)
    }

    /// All accounts known to the role service; empty if it could not be reached
    pub async fn all_users(&self, get_all: bool) -> Vec<UserSummary> {
        match self.roles.get_all_users(get_all).await {
            Ok(users) => users,
            Err(err) => {
                tracing::error!(?err, "listing users failed");
                Vec::new()
            }
        }
    }

    async fn grant_all(&self, claim: Claim, users: &[UserSummary]) -> Vec<(UserId, Error)> {
        let results = future::join_all(
            users
                .iter()
                .map(|u| self.roles.set_claim(claim, &u.uid, true)),
        )
        .await;
        users
            .iter()
            .zip(results)
            .filter_map(|(u, res)| {
                let err = res.err()?;
                tracing::warn!(?err, uid = %u.uid, claim = claim.as_str(), "granting claim failed");
                Some((u.uid.clone(), err))
            })
            .collect()
    }

    /// Marks every user of `users` as validated, returning the failures
    pub async fn verify_all_users(&self, users: &[UserSummary]) -> Vec<(UserId, Error)> {
        self.grant_all(Claim::Validated, users).await
    }

    pub async fn pwot_all_users(&self, users: &[UserSummary]) -> Vec<(UserId, Error)> {
        self.grant_all(Claim::Pwot, users).await
    }

    /// Pushes every stored `avatarUrl` to the role service, returning how many were pushed
    pub async fn migrate_all_avatars(&self) -> Result<usize, Error> {
        let users =
            store_ext::list_records::<UserProfile>(&*self.store, &CollectionPath::users()).await?;
        let mut pushed = 0;
        for user in users {
            let Some(url) = user.avatar_url.as_deref() else {
                continue;
            };
            let res = self.roles.set_avatar(&user.uid, url).await;
            if logged("avatar migration", &user.uid, res).is_ok() {
                pushed += 1;
            }
        }
        Ok(pushed)
    }

    /// Whether the signed-in user is banned
    ///
    /// Concurrent callers share a single role-service call. Signed-out users,
    /// and failed checks, read as not banned.
    pub async fn is_banned(&self) -> bool {
        if self.identity.current_user().is_none() {
            return false;
        }
        let check = {
            let mut pending = self.banned_check.lock();
            match &*pending {
                Some(check) => check.clone(),
                None => {
                    let roles = self.roles.clone();
                    let check = async move {
                        roles.check_if_banned().await.unwrap_or_else(|err| {
                            tracing::error!(?err, "checking ban status failed");
                            false
                        })
                    }
                    .boxed()
                    .shared();
                    *pending = Some(check.clone());
                    check
                }
            }
        };
        let res = check.clone().await;
        let mut pending = self.banned_check.lock();
        if pending.as_ref().map_or(false, |p| p.ptr_eq(&check)) {
            *pending = None;
        }
        res
    }

    pub async fn submit_invite_code(
        &self,
        user: &AuthUser,
        code: &str,
        should_create: bool,
    ) -> Result<(), Error> {
        logged(
            "invite code",
            &user.uid,
            self.roles.process_invite_code(user, code, should_create).await,
        )
    }

    pub async fn all_invites(&self) -> Result<Vec<Invite>, Error> {
        store_ext::list_records(&*self.store, &CollectionPath::invites()).await
    }

    pub async fn invites_for(&self, uid: &UserId) -> Result<Vec<Invite>, Error> {
        let mut invites = self.all_invites().await?;
        invites.retain(|i| i.created_by_uid == *uid);
        Ok(invites)
    }
}
