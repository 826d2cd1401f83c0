use crate::Record;

string_id!(UserId);

/// Public projection of a user, as stored under `usersPublic/{uid}`
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct UserProfile {
    #[serde(skip)]
    pub uid: UserId,

    #[serde(rename = "displayName", default)]
    pub display_name: String,
    #[serde(rename = "photoURL", default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    #[serde(rename = "avatarUrl", default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,

    /// Set on placeholders returned when the profile could not be fetched
    #[serde(skip)]
    pub unknown: bool,
}

impl Record for UserProfile {
    fn set_id(&mut self, id: &str) {
        self.uid = UserId::from(id);
    }
}

impl UserProfile {
    pub fn unknown(uid: UserId) -> UserProfile {
        UserProfile {
            uid,
            display_name: String::from("?"),
            photo_url: None,
            avatar_url: None,
            unknown: true,
        }
    }
}
