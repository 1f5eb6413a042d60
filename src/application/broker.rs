use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::api::{Backend, DownloadAcceptance, DownloadStatusResponse};
use crate::domain::{BackendConfig, BrokerError, Credentials};

const INBOX_CAPACITY: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneralOptions {
    pub backend_url: String,
}

/// `{type: "download", url, jwtToken?, apiKey, generalOptions}`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadMessage {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwt_token: Option<String>,
    pub api_key: String,
    pub general_options: GeneralOptions,
}

/// `{type: "download-status", uuid, jwtToken?, apiKey, generalOptions}`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadStatusMessage {
    pub uuid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwt_token: Option<String>,
    pub api_key: String,
    pub general_options: GeneralOptions,
}

/// A recognized inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum BrokerRequest {
    Download(DownloadMessage),
    DownloadStatus(DownloadStatusMessage),
}

impl BrokerRequest {
    /// Route an untyped message on its `type` field.
    pub fn from_message(message: Value) -> Result<Self, BrokerError> {
        let kind = message.get("type").and_then(Value::as_str).map(str::to_owned);

        match kind.as_deref() {
            Some("download") => serde_json::from_value(message)
                .map(BrokerRequest::Download)
                .map_err(|source| BrokerError::InvalidMessage { kind: "download", source }),
            Some("download-status") => serde_json::from_value(message)
                .map(BrokerRequest::DownloadStatus)
                .map_err(|source| BrokerError::InvalidMessage {
                    kind: "download-status",
                    source,
                }),
            _ => Err(BrokerError::Routing(kind)),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            BrokerRequest::Download(_) => "download",
            BrokerRequest::DownloadStatus(_) => "download-status",
        }
    }

    /// The untyped form UI surfaces put on the wire.
    pub fn to_message(&self) -> Result<Value, BrokerError> {
        serde_json::to_value(self).map_err(|source| BrokerError::InvalidMessage {
            kind: self.kind(),
            source,
        })
    }
}

fn credentials(api_key: &str, jwt_token: Option<&String>) -> Credentials {
    Credentials {
        api_key: api_key.to_owned(),
        session_token: jwt_token.cloned(),
    }
}

/// The generic error every failure collapses into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReply {
    pub error: String,
    pub message: String,
}

impl Default for ErrorReply {
    fn default() -> Self {
        Self {
            error: "error".to_string(),
            message: "Invalid request".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum BrokerReply {
    Download(DownloadAcceptance),
    Status(DownloadStatusResponse),
    Error(ErrorReply),
}

/// Whether the reply was sent before `dispatch` returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Replied,
    Pending,
}

struct Envelope {
    message: Value,
    reply: oneshot::Sender<BrokerReply>,
}

/// Cheap handle UI surfaces use to talk to the broker.
#[derive(Clone)]
pub struct BrokerHandle {
    inbox: mpsc::Sender<Envelope>,
}

impl BrokerHandle {
    /// Send a message and wait for its single reply.
    pub async fn send_message(&self, message: Value) -> Result<BrokerReply, BrokerError> {
        let (reply, response) = oneshot::channel();
        self.inbox
            .send(Envelope { message, reply })
            .await
            .map_err(|_| BrokerError::Disconnected)?;

        response.await.map_err(|_| BrokerError::Disconnected)
    }

    pub async fn send(&self, request: &BrokerRequest) -> Result<BrokerReply, BrokerError> {
        self.send_message(request.to_message()?).await
    }
}

/// Routes inbound messages to a [`Backend`] and answers each exactly once.
///
/// Holds no state between requests; every request runs on its own task.
pub struct MessageBroker {
    backend: Arc<dyn Backend>,
}

impl MessageBroker {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Start listening. The broker stops once every handle is dropped.
    pub fn spawn(self) -> (BrokerHandle, JoinHandle<()>) {
        let (inbox, mut rx) = mpsc::channel::<Envelope>(INBOX_CAPACITY);

        let task = tokio::spawn(async move {
            info!("message broker is running");
            while let Some(Envelope { message, reply }) = rx.recv().await {
                self.dispatch(message, reply);
            }
            debug!("message broker stopped");
        });

        (BrokerHandle { inbox }, task)
    }

    /// Answer a single message.
    ///
    /// Invalid messages are answered before returning. Recognized ones are
    /// handed to a task that replies once the backend settles.
    pub fn dispatch(&self, message: Value, reply: oneshot::Sender<BrokerReply>) -> Dispatch {
        let request = match BrokerRequest::from_message(message) {
            Ok(request) => request,
            Err(e) => {
                warn!("rejecting message: {}", e);
                // The caller may already be gone, nothing to do then.
                let _ = reply.send(BrokerReply::Error(ErrorReply::default()));
                return Dispatch::Replied;
            }
        };

        let backend = Arc::clone(&self.backend);
        tokio::spawn(async move {
            let outcome = handle(backend.as_ref(), request).await;
            let _ = reply.send(outcome);
        });

        Dispatch::Pending
    }
}

async fn handle(backend: &dyn Backend, request: BrokerRequest) -> BrokerReply {
    match request {
        BrokerRequest::Download(msg) => {
            debug!(url = %msg.url, "routing download request");
            let config = BackendConfig::new(msg.general_options.backend_url);
            let credentials = credentials(&msg.api_key, msg.jwt_token.as_ref());

            match backend.submit_download(&msg.url, &credentials, &config).await {
                Ok(acceptance) => BrokerReply::Download(acceptance),
                Err(e) => {
                    error!("Error starting download: {}", e);
                    BrokerReply::Error(ErrorReply::default())
                }
            }
        }
        BrokerRequest::DownloadStatus(msg) => {
            debug!(uuid = %msg.uuid, "routing download-status request");
            let config = BackendConfig::new(msg.general_options.backend_url);
            let credentials = credentials(&msg.api_key, msg.jwt_token.as_ref());

            match backend.query_status(&msg.uuid, &credentials, &config).await {
                Ok(status) => BrokerReply::Status(status),
                Err(e) => {
                    error!("Error getting download status: {}", e);
                    BrokerReply::Error(ErrorReply::default())
                }
            }
        }
    }
}
