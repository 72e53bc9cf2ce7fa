use chrono::{DateTime, Utc};
use core_types::ZoneCode;
use serde::{Deserialize, Serialize};

/// The text the broker bridge embeds in an `INFO` record once a close has settled.
pub const CLOSE_CONFIRMATION_MARKER: &str = "Successfully closed order";

/// An error record reported by the broker bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMsg {
    pub error_type: String,
    pub description: String,
}

/// An informational record reported by the broker bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfoMsg {
    pub message: String,
}

impl InfoMsg {
    /// Returns true when this record is the authoritative close confirmation for `ticket`.
    ///
    /// The ticket must appear as a whole token, so ticket `12` is not confirmed
    /// by a message about ticket `123`.
    pub fn confirms_close_of(&self, ticket: u64) -> bool {
        if !self.message.contains(CLOSE_CONFIRMATION_MARKER) {
            return false;
        }
        let wanted = ticket.to_string();
        self.message
            .split(|c: char| !c.is_ascii_alphanumeric())
            .any(|token| token == wanted)
    }
}

/// A record on the broker's message stream.
///
/// Serialized with an internal `type` tag so the wire shape stays flat:
/// `{ "type": "INFO", "message": "..." }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum BrokerMessage {
    Error(ErrorMsg),
    Info(InfoMsg),
}

/// A state change reported by an order-lifecycle controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "transition", content = "payload")]
pub enum OrderTransition {
    /// A fresh session window was computed while no order is tracked.
    WindowScheduled {
        session: String,
        open_at: DateTime<Utc>,
        close_at: DateTime<Utc>,
    },
    /// An open request was sent to the broker.
    OpenRequested {
        session: String,
        window_open: DateTime<Utc>,
        gating_zone: Option<ZoneCode>,
    },
    /// A matching broker order was adopted.
    Opened {
        session: String,
        ticket: u64,
        executed_open_time: DateTime<Utc>,
        scheduled_close_time: DateTime<Utc>,
    },
    /// The first close request for the tracked ticket was sent.
    CloseRequested { session: String, ticket: u64 },
    /// A close request was resent from the retry ladder.
    CloseRetried {
        session: String,
        ticket: u64,
        elapsed_secs: i64,
    },
    /// The broker confirmed the close; the controller is idle again.
    Closed { session: String, ticket: u64 },
}
