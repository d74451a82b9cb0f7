//! Public types for the simmer API.

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};

/// Item id. Positive, dense, monotonically increasing at the remote.
pub type Id = u64;

/// Item type as reported by the remote.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Job,
    Story,
    Comment,
    Poll,
    #[serde(rename = "pollopt")]
    PollOption,
    /// The remote returned the JSON `null` body for this id (typical for
    /// very new items and ids past the max).
    #[default]
    #[serde(rename = "", other)]
    NullBody,
}

/// A single remote item. Only `id` and `time` are structurally required;
/// everything else is whatever the remote sent.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Item {
    pub id: Id,
    #[serde(rename = "type")]
    pub kind: ItemKind,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub by: String,
    pub time: i64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<Id>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll: Option<Id>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub kids: Vec<Id>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub url: String,
    pub score: i64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub title: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parts: Vec<Id>,
    pub descendants: i64,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub dead: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub deleted: bool,
}

impl Item {
    /// Creation time as wall clock.
    pub fn created(&self) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(self.time.max(0) as u64)
    }

    /// Created after the cutoff, not dead, not deleted.
    pub fn is_active(&self, active_after: SystemTime) -> bool {
        self.created() > active_after && !self.dead && !self.deleted
    }

    /// An item without a parent; trees hang off roots.
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// A user profile.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct User {
    pub id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub about: String,
    pub created: i64,
    pub karma: i64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub submitted: Vec<Id>,
}
