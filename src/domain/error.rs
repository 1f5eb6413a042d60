use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Unrecognized request type: {0:?}")]
    Routing(Option<String>),

    #[error("Malformed {kind} request: {source}")]
    InvalidMessage {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Message broker is not running")]
    Disconnected,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to access settings file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse settings: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid backend URL {0:?}: {1}")]
    InvalidBackendUrl(String, url::ParseError),

    #[error("No settings directory available")]
    NoConfigDir,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppError {
    #[error("Invalid Youtube URL or Youtube tab not detected")]
    InvalidInput,

    #[error("Error downloading video")]
    Rejected,

    #[error("Backend accepted the download without an identifier")]
    MissingDownloadId,

    #[error("Message broker is not running")]
    Disconnected,
}
