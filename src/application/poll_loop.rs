use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::broker::{BrokerHandle, BrokerReply, BrokerRequest, DownloadStatusMessage, GeneralOptions};
use crate::domain::{BackendConfig, BrokerError, Credentials, Notification, PollFailure, PollState};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

pub const FINISHED_MESSAGE: &str = "Download finished";
pub const STATUS_ERROR_MESSAGE: &str = "Error getting download status";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    /// Give up after this many status requests. `None` polls until the
    /// backend reports a terminal state.
    pub max_attempts: Option<u32>,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: None,
        }
    }
}

/// Surfaces poll outcomes to the user.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// The download being watched and how to reach the backend about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusTarget {
    pub download_id: String,
    pub credentials: Credentials,
    pub backend: BackendConfig,
}

impl StatusTarget {
    fn request(&self) -> BrokerRequest {
        BrokerRequest::DownloadStatus(DownloadStatusMessage {
            uuid: self.download_id.clone(),
            jwt_token: self.credentials.session_token().map(str::to_owned),
            api_key: self.credentials.api_key.clone(),
            general_options: GeneralOptions {
                backend_url: self.backend.backend_base_url.clone(),
            },
        })
    }
}

/// Polls the status of one download at a time.
///
/// Starting a new poll cancels the running one; dropping the loop cancels it
/// too. A status request already in flight when cancelled is left to finish
/// and its answer is ignored.
pub struct PollLoop {
    broker: BrokerHandle,
    notifier: Arc<dyn Notifier>,
    settings: PollSettings,
    state: Arc<watch::Sender<PollState>>,
    active: Option<JoinHandle<()>>,
}

impl PollLoop {
    pub fn new(broker: BrokerHandle, notifier: Arc<dyn Notifier>, settings: PollSettings) -> Self {
        let (state, _) = watch::channel(PollState::Idle);
        Self {
            broker,
            notifier,
            settings,
            state: Arc::new(state),
            active: None,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<PollState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> PollState {
        self.state.borrow().clone()
    }

    pub fn start(&mut self, target: StatusTarget) {
        self.cancel();

        info!(download_id = %target.download_id, "watching download");
        self.state.send_replace(PollState::Polling { attempts: 0 });

        self.active = Some(tokio::spawn(run(
            self.broker.clone(),
            Arc::clone(&self.notifier),
            self.settings,
            target,
            Arc::clone(&self.state),
        )));
    }

    /// Stop the timer. A poll that had not reached a terminal state goes
    /// back to `Idle`.
    pub fn cancel(&mut self) {
        if let Some(task) = self.active.take() {
            task.abort();
            self.state.send_if_modified(|state| {
                if matches!(state, PollState::Polling { .. }) {
                    *state = PollState::Idle;
                    true
                } else {
                    false
                }
            });
        }
    }
}

impl Drop for PollLoop {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn run(
    broker: BrokerHandle,
    notifier: Arc<dyn Notifier>,
    settings: PollSettings,
    target: StatusTarget,
    state: Arc<watch::Sender<PollState>>,
) {
    let request = target.request();

    // Like a browser interval, the first tick comes one period after start.
    // A slow answer delays the next tick rather than stacking requests.
    let mut ticks = time::interval_at(Instant::now() + settings.interval, settings.interval);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut attempts = 0u32;
    let outcome = loop {
        ticks.tick().await;
        attempts += 1;
        state.send_replace(PollState::Polling { attempts });
        debug!(download_id = %target.download_id, attempts, "polling download status");

        match broker.send(&request).await {
            Ok(BrokerReply::Status(status)) if status.has_error() => {
                break PollState::Failed(PollFailure::Status(status));
            }
            Ok(BrokerReply::Status(status)) if status.finished => {
                break PollState::Finished(status);
            }
            Ok(BrokerReply::Status(status)) => {
                debug!(
                    download_id = %target.download_id,
                    percent = status.percent_complete,
                    "download still running"
                );
            }
            Ok(BrokerReply::Error(reply)) => {
                break PollState::Failed(PollFailure::Rejected(reply.message));
            }
            Ok(BrokerReply::Download(_)) => {
                break PollState::Failed(PollFailure::Rejected(
                    "unexpected reply to a status request".to_string(),
                ));
            }
            Err(BrokerError::Disconnected) => break PollState::Failed(PollFailure::Disconnected),
            Err(e) => break PollState::Failed(PollFailure::Rejected(e.to_string())),
        }

        if settings.max_attempts.is_some_and(|max| attempts >= max) {
            warn!(download_id = %target.download_id, attempts, "giving up on download");
            break PollState::Failed(PollFailure::AttemptsExhausted(attempts));
        }
    };

    match &outcome {
        PollState::Finished(_) => {
            info!(download_id = %target.download_id, attempts, "download finished");
            notifier.notify(Notification::Success(FINISHED_MESSAGE.to_string()));
        }
        failed => {
            warn!(download_id = %target.download_id, attempts, ?failed, "download failed");
            notifier.notify(Notification::Error(STATUS_ERROR_MESSAGE.to_string()));
        }
    }

    state.send_replace(outcome);
}
