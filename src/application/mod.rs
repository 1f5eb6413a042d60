pub mod broker;
pub mod download_coordinator;
pub mod poll_loop;

pub use broker::{BrokerHandle, BrokerReply, BrokerRequest, ErrorReply, MessageBroker};
pub use download_coordinator::DownloadCoordinator;
pub use poll_loop::{Notifier, PollLoop, PollSettings, StatusTarget};
