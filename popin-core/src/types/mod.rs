pub mod account;
pub mod queue;

pub use account::{CallDetails, ConnectResponse, RegisteredUser};
pub use queue::{CallId, CallQueueId, ConnectionUpdate, QueueStatus, StatusError, StatusUpdate};
