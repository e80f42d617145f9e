use crate::contact::ContactError;
use crate::types::StatusError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("transport error: {0}")]
    Transport(#[from] anyhow::Error),

    #[error("unexpected HTTP status {0}")]
    Http(u16),

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("request rejected: {}", .0.as_deref().unwrap_or("no message"))]
    Rejected(Option<String>),

    #[error("invalid status update: {0}")]
    Status(#[from] StatusError),

    #[error(transparent)]
    Contact(#[from] ContactError),
}

impl ApiError {
    /// Transport, HTTP and decode failures are worth retrying; the rest are
    /// answers from the server or bad input.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Http(_) | Self::Decode(_) | Self::Status(_)
        )
    }
}
