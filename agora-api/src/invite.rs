use crate::{Record, Time, UserId};

string_id!(InviteId);

/// Invites are issued and redeemed by the role service, the core only lists them
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Invite {
    #[serde(skip)]
    pub id: InviteId,

    #[serde(default)]
    pub was_used: bool,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: Time,
    pub created_by_name: String,
    pub created_by_uid: UserId,
}

impl Record for Invite {
    fn set_id(&mut self, id: &str) {
        self.id = InviteId::from(id);
    }
}
