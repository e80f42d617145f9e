// Re-export core modules for compatibility
pub use popin_core::{ApiError, api, contact, wait};

// Core types are re-exported, but events (with the listener plumbing) remain here
pub mod types {
    pub use popin_core::types::*;
    pub mod events;
}

// Runtime-specific modules remain here
pub mod acceptance;
pub mod client;
pub mod config;
pub mod http;
pub mod session;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use acceptance::{CallAcceptanceWaitHandler, ConnectionStatusSource};
pub use client::PopinClient;
pub use config::ClientConfig;
pub use types::events::{AcceptanceEvent, CallAcceptanceListener, ChannelListener};
