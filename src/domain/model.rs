use crate::api::DownloadStatusResponse;

/// Where the backend lives. The URL is kept as supplied and only validated
/// when a request is built, so a bad value never reaches the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    pub backend_base_url: String,
}

impl BackendConfig {
    pub fn new(backend_base_url: impl Into<String>) -> Self {
        Self {
            backend_base_url: backend_base_url.into(),
        }
    }
}

/// Credentials attached to every outbound request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub api_key: String,
    /// Session token obtained through login; sent as `jwt` when present.
    pub session_token: Option<String>,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            session_token: None,
        }
    }

    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    /// The session token, ignoring empty values.
    pub fn session_token(&self) -> Option<&str> {
        self.session_token.as_deref().filter(|t| !t.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollState {
    Idle,
    Polling { attempts: u32 },
    Finished(DownloadStatusResponse),
    Failed(PollFailure),
}

impl PollState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PollState::Finished(_) | PollState::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollFailure {
    /// The broker answered with its generic error reply.
    Rejected(String),
    /// The status snapshot carried an error flag.
    Status(DownloadStatusResponse),
    /// The broker went away while polling.
    Disconnected,
    /// No terminal status within the configured number of polls.
    AttemptsExhausted(u32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Success(String),
    Error(String),
}
