use std::collections::BTreeSet;

use crate::{Record, Time, UserId};

string_id!(ForumId);

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Forum {
    #[serde(skip)]
    pub id: ForumId,

    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<UserId>,

    #[serde(
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_time: Option<Time>,

    #[serde(default)]
    pub unread_by: BTreeSet<UserId>,
}

impl Record for Forum {
    fn set_id(&mut self, id: &str) {
        self.id = ForumId::from(id);
    }
}

impl Forum {
    pub fn is_unread_for(&self, uid: &UserId) -> bool {
        self.unread_by.contains(uid)
    }
}
