use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

use super::broker::{BrokerHandle, BrokerReply, BrokerRequest, DownloadMessage, GeneralOptions};
use super::poll_loop::{Notifier, PollLoop, PollSettings, StatusTarget};
use crate::config::ConfigSnapshot;
use crate::domain::{AppError, Notification, PollState};
use crate::utils::is_youtube_watch_url;

/// What the popup does: submit the current video, then watch it.
pub struct DownloadCoordinator {
    broker: BrokerHandle,
    notifier: Arc<dyn Notifier>,
    poll: PollLoop,
}

impl DownloadCoordinator {
    pub fn new(broker: BrokerHandle, notifier: Arc<dyn Notifier>, settings: PollSettings) -> Self {
        let poll = PollLoop::new(broker.clone(), Arc::clone(&notifier), settings);
        Self {
            broker,
            notifier,
            poll,
        }
    }

    /// Submit `source_url` and start polling it. Returns the download id.
    pub async fn start_download(
        &mut self,
        source_url: &str,
        config: &ConfigSnapshot,
    ) -> Result<String, AppError> {
        if !is_youtube_watch_url(source_url) {
            return Err(AppError::InvalidInput);
        }

        let request = BrokerRequest::Download(DownloadMessage {
            url: source_url.to_string(),
            jwt_token: config.credentials.session_token().map(str::to_owned),
            api_key: config.credentials.api_key.clone(),
            general_options: GeneralOptions {
                backend_url: config.backend.backend_base_url.clone(),
            },
        });

        let result = match self.broker.send(&request).await {
            Ok(BrokerReply::Download(acceptance)) if !acceptance.has_error() => acceptance
                .download_id()
                .map(str::to_owned)
                .ok_or(AppError::MissingDownloadId),
            Ok(_) => Err(AppError::Rejected),
            Err(_) => Err(AppError::Disconnected),
        };

        let download_id = match result {
            Ok(id) => id,
            Err(e) => {
                warn!(url = source_url, "download not started: {}", e);
                self.notifier
                    .notify(Notification::Error(AppError::Rejected.to_string()));
                return Err(e);
            }
        };

        info!(url = source_url, download_id = %download_id, "download accepted");
        self.poll.start(StatusTarget {
            download_id: download_id.clone(),
            credentials: config.credentials.clone(),
            backend: config.backend.clone(),
        });

        Ok(download_id)
    }

    pub fn subscribe(&self) -> watch::Receiver<PollState> {
        self.poll.subscribe()
    }

    pub fn state(&self) -> PollState {
        self.poll.state()
    }

    /// Wait until the current poll stops, either in a terminal state or
    /// because it was torn down.
    pub async fn wait(&self) -> PollState {
        let mut rx = self.poll.subscribe();
        let settled = rx
            .wait_for(|state| !matches!(state, PollState::Polling { .. }))
            .await
            .map(|state| state.clone());
        settled.unwrap_or(PollState::Idle)
    }

    pub fn teardown(&mut self) {
        self.poll.cancel();
    }
}
