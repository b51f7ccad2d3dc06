use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::WarId;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Backend id. Absent on local echoes that have not been persisted yet.
    pub id: Option<String>,

    pub sender_address: String,

    pub body: String,

    pub sent_at: DateTime<Utc>,

    pub war_id: WarId,
}

/// Delivery state of a rendered chat line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// Authored locally, not yet matched to a persisted record.
    Pending { local_id: u64 },

    Confirmed,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChatEntry {
    pub message: ChatMessage,
    pub delivery: Delivery,
}

impl ChatEntry {
    pub fn confirmed(message: ChatMessage) -> Self {
        Self {
            message,
            delivery: Delivery::Confirmed,
        }
    }

    pub fn pending(message: ChatMessage, local_id: u64) -> Self {
        Self {
            message,
            delivery: Delivery::Pending { local_id },
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.delivery, Delivery::Pending { .. })
    }

    pub fn local_id(&self) -> Option<u64> {
        match self.delivery {
            Delivery::Pending { local_id } => Some(local_id),
            Delivery::Confirmed => None,
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.message.id.as_deref()
    }
}
