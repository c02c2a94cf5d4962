//! A joiner's signaling identity within a room.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One entry of a room's member list.
///
/// Everything except `connection_id` comes straight from the join request and
/// is stored unexamined. Absent request fields stay `None` and serialize as
/// `null`, which is what peers see in `someone_joined`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub connection_id: String,
    pub sdp: Option<String>,
    pub peer_id: Option<String>,
    #[serde(rename = "name")]
    pub display_name: Option<String>,
}

impl Participant {
    /// Serialize into the standalone blob stored per list entry.
    pub fn to_blob(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_blob(blob: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(blob)
    }
}
