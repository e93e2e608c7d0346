//! Notification records pushed by the server.
//!
//! A [`NotificationRecord`] is immutable once received: the client only
//! forwards it to subscribers and the native notification bridge. Roster,
//! shift and approval specifics stay inside the opaque `metadata` value.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{DbId, Timestamp};

/// Delivery priority assigned by the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    /// Urgent alerts stay on screen until the user acts on them.
    Urgent,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Priority::Low),
            "normal" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            "urgent" => Ok(Priority::Urgent),
            other => Err(CoreError::Validation(format!(
                "Unknown notification priority '{other}'"
            ))),
        }
    }
}

/// A single notification as delivered over the real-time channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRecord {
    /// Server-assigned unique identifier.
    pub id: DbId,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub priority: Priority,
    /// Opaque in-app link (e.g. `/shifts/42`) used for click-through.
    #[serde(default)]
    pub action_url: Option<String>,
    /// Server-side category, e.g. `"shift_assigned"`.
    #[serde(default)]
    pub notification_type: Option<String>,
    /// Free-form business payload. Never interpreted by the client.
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub created_at: Timestamp,
    #[serde(default)]
    pub read_at: Option<Timestamp>,
}

impl NotificationRecord {
    pub fn is_urgent(&self) -> bool {
        self.priority == Priority::Urgent
    }

    pub fn is_read(&self) -> bool {
        self.read_at.is_some()
    }
}
