pub mod error;
pub mod model;

pub use error::{AppError, BrokerError, ConfigError};
pub use model::{BackendConfig, Credentials, Notification, PollFailure, PollState};
