use crate::UserId;

/// Role flags carried by the identity token, issued by the role service
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Claims {
    #[serde(default)]
    pub admin: bool,
    #[serde(default, rename = "mod")]
    pub moderator: bool,
    #[serde(default)]
    pub banned: bool,
    #[serde(default)]
    pub validated: bool,
    #[serde(default)]
    pub pwot: bool,
}

impl Claims {
    pub fn none() -> Claims {
        Claims::default()
    }

    pub fn admin() -> Claims {
        Claims {
            admin: true,
            validated: true,
            ..Claims::default()
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Claim {
    Admin,
    Mod,
    Banned,
    Validated,
    Pwot,
}

impl Claim {
    pub fn as_str(&self) -> &'static str {
        match self {
            Claim::Admin => "admin",
            Claim::Mod => "mod",
            Claim::Banned => "banned",
            Claim::Validated => "validated",
            Claim::Pwot => "pwot",
        }
    }
}

/// Signed-in user as reported by the identity provider
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
    pub uid: UserId,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Entry of the role service's user listing
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub uid: UserId,
    #[serde(default)]
    pub display_name: String,
    #[serde(rename = "photoURL", default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default)]
    pub custom_claims: Claims,
}

/// Who is acting, and with which capabilities
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Viewer {
    pub uid: UserId,
    pub claims: Claims,
}

impl Viewer {
    pub fn new(uid: UserId, claims: Claims) -> Viewer {
        Viewer { uid, claims }
    }

    pub fn is_admin(&self) -> bool {
        self.claims.admin
    }

    /// Only the author of some content, or an admin, may edit or delete it
    pub fn can_modify(&self, author: &UserId) -> bool {
        self.uid == *author || self.is_admin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claims_decode_from_token_map() {
        let claims: Claims =
            serde_json::from_str(r#"{"admin": false, "mod": true, "other": 1}"#).unwrap();
        assert!(claims.moderator);
        assert!(!claims.admin);
        assert!(!claims.banned);
    }

    #[test]
    fn only_author_or_admin_may_modify() {
        let author = UserId::from("author");
        assert!(Viewer::new(author.clone(), Claims::none()).can_modify(&author));
        assert!(Viewer::new(UserId::from("root"), Claims::admin()).can_modify(&author));
        assert!(!Viewer::new(UserId::from("other"), Claims::none()).can_modify(&author));
    }
}
