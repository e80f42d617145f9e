use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Server-side identifier of a waiting line entry.
pub type CallQueueId = i64;

/// Identifier of an accepted call, used to fetch the call details.
pub type CallId = i64;

/// Status codes reported by the connection update endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i64)]
pub enum QueueStatus {
    Queued = 1,
    Accepted = 2,
    Missed = 3,
}

impl TryFrom<i64> for QueueStatus {
    type Error = StatusError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Queued),
            2 => Ok(Self::Accepted),
            3 => Ok(Self::Missed),
            other => Err(StatusError::UnknownStatus(other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StatusError {
    #[error("unknown queue status code {0}")]
    UnknownStatus(i64),
    #[error("accepted status without call_id")]
    MissingCallId,
}

/// Wire shape of `/user/connect/update` responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionUpdate {
    pub status: i64,
    #[serde(default)]
    pub position: Option<i64>,
    #[serde(default)]
    pub call_id: Option<CallId>,
    #[serde(default)]
    pub message: Option<String>,
}

/// A validated poll result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusUpdate {
    /// Still waiting. `position` is `None` when the server did not report
    /// one (or reported a negative placeholder).
    Queued {
        position: Option<u32>,
        message: Option<String>,
    },
    Accepted {
        call_id: CallId,
        message: Option<String>,
    },
    Missed {
        message: Option<String>,
    },
}

impl StatusUpdate {
    pub fn queued(position: u32) -> Self {
        Self::Queued {
            position: Some(position),
            message: None,
        }
    }

    pub fn accepted(call_id: CallId) -> Self {
        Self::Accepted {
            call_id,
            message: None,
        }
    }

    pub fn missed() -> Self {
        Self::Missed { message: None }
    }

    pub fn status(&self) -> QueueStatus {
        match self {
            Self::Queued { .. } => QueueStatus::Queued,
            Self::Accepted { .. } => QueueStatus::Accepted,
            Self::Missed { .. } => QueueStatus::Missed,
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Queued { message, .. }
            | Self::Accepted { message, .. }
            | Self::Missed { message } => message.as_deref(),
        }
    }
}

impl TryFrom<ConnectionUpdate> for StatusUpdate {
    type Error = StatusError;

    fn try_from(raw: ConnectionUpdate) -> Result<Self, Self::Error> {
        let message = raw.message;
        match QueueStatus::try_from(raw.status)? {
            QueueStatus::Queued => Ok(Self::Queued {
                position: raw.position.and_then(|p| u32::try_from(p).ok()),
                message,
            }),
            QueueStatus::Accepted => {
                let call_id = raw.call_id.ok_or(StatusError::MissingCallId)?;
                Ok(Self::Accepted { call_id, message })
            }
            QueueStatus::Missed => Ok(Self::Missed { message }),
        }
    }
}
