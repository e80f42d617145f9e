pub mod api;
pub mod contact;
pub mod error;
pub mod net;
pub mod types;
pub mod wait;

pub use error::ApiError;
