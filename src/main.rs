use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use ytdl_relay::api::BackendClient;
use ytdl_relay::application::broker::{DownloadStatusMessage, GeneralOptions};
use ytdl_relay::application::{
    BrokerReply, BrokerRequest, DownloadCoordinator, MessageBroker, Notifier, PollSettings,
};
use ytdl_relay::config::{ConfigProvider, FileConfigProvider, Settings};
use ytdl_relay::domain::{BackendConfig, Notification, PollFailure, PollState};

#[derive(Parser)]
#[command(name = "ytdl-relay", version)]
#[command(about = "Send YouTube videos to a youtube-dl backend and follow the download")]
struct Cli {
    /// Settings file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Download a video's audio and wait for the backend to finish
    Download {
        /// YouTube watch URL
        url: String,

        /// Time between status checks
        #[arg(long, default_value_t = 1000, value_parser = clap::value_parser!(u64).range(1..))]
        interval_ms: u64,

        /// Stop after this many status checks
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        max_polls: Option<u32>,
    },
    /// Print the status of a download once
    Status { uuid: String },
    /// Check that the backend is up
    Health,
    /// Log in with the stored username and password
    Login,
    /// Update stored settings
    Configure {
        #[arg(long)]
        backend_url: Option<String>,
        #[arg(long)]
        api_key: Option<String>,
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        password: Option<String>,
        /// Whether the backend requires a login
        #[arg(long)]
        need_auth: Option<bool>,
    },
}

struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, notification: Notification) {
        match notification {
            Notification::Success(message) => println!("{}", message),
            Notification::Error(message) => eprintln!("{}", message),
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "ytdl_relay=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let provider = match cli.config {
        Some(path) => FileConfigProvider::new(path),
        None => FileConfigProvider::default_location()?,
    };

    match cli.command {
        Command::Download {
            url,
            interval_ms,
            max_polls,
        } => {
            let settings = PollSettings {
                interval: Duration::from_millis(interval_ms),
                max_attempts: max_polls,
            };
            download(&provider, &url, settings).await
        }
        Command::Status { uuid } => status(&provider, uuid).await,
        Command::Health => {
            let snapshot = provider.snapshot()?;
            let health = BackendClient::new()
                .health_check(&snapshot.backend)
                .await
                .context("Failed to health check!")?;
            println!("{}", serde_json::to_string_pretty(&health)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Login => {
            let mut settings = provider.load()?;
            login(&provider, &mut settings).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Configure {
            backend_url,
            api_key,
            username,
            password,
            need_auth,
        } => {
            let mut settings = provider.load()?;
            if let Some(backend_url) = backend_url {
                settings.set_backend_url(&backend_url)?;
            }
            if let Some(api_key) = api_key {
                settings.auth_options.api_key = api_key;
            }
            if username.is_some() {
                settings.auth_options.username = username;
            }
            if password.is_some() {
                settings.auth_options.password = password;
            }
            if let Some(need_auth) = need_auth {
                settings.auth_options.need_auth = need_auth;
            }

            provider.save(&settings)?;
            println!("Settings saved to {}", provider.path().display());

            if settings.auth_options.need_auth {
                println!("Logging in...");
                login(&provider, &mut settings).await?;
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn download(provider: &FileConfigProvider, url: &str, settings: PollSettings) -> Result<ExitCode> {
    let snapshot = provider.snapshot()?;
    let (broker, _task) = MessageBroker::new(Arc::new(BackendClient::new())).spawn();
    let mut coordinator = DownloadCoordinator::new(broker, Arc::new(ConsoleNotifier), settings);

    let download_id = coordinator.start_download(url, &snapshot).await?;
    println!("Downloading {} ({})", url, download_id);

    let settled = tokio::select! {
        state = coordinator.wait() => Some(state),
        _ = tokio::signal::ctrl_c() => None,
    };

    let Some(state) = settled else {
        coordinator.teardown();
        eprintln!("Stopped watching {}", download_id);
        return Ok(ExitCode::from(130));
    };

    match state {
        PollState::Finished(_) => Ok(ExitCode::SUCCESS),
        PollState::Failed(PollFailure::AttemptsExhausted(attempts)) => {
            eprintln!("No result after {} status checks", attempts);
            Ok(ExitCode::FAILURE)
        }
        _ => Ok(ExitCode::FAILURE),
    }
}

async fn status(provider: &FileConfigProvider, uuid: String) -> Result<ExitCode> {
    let snapshot = provider.snapshot()?;
    let (broker, _task) = MessageBroker::new(Arc::new(BackendClient::new())).spawn();

    let request = BrokerRequest::DownloadStatus(DownloadStatusMessage {
        uuid,
        jwt_token: snapshot.credentials.session_token().map(str::to_owned),
        api_key: snapshot.credentials.api_key,
        general_options: GeneralOptions {
            backend_url: snapshot.backend.backend_base_url,
        },
    });

    let reply = broker.send(&request).await?;
    println!("{}", serde_json::to_string_pretty(&reply)?);

    Ok(match reply {
        BrokerReply::Error(_) => ExitCode::FAILURE,
        _ => ExitCode::SUCCESS,
    })
}

async fn login(provider: &FileConfigProvider, settings: &mut Settings) -> Result<()> {
    if settings.auth_options.api_key.is_empty() {
        bail!("Please provide a valid API key!");
    }

    let backend = BackendConfig::new(settings.general_options.backend_url.clone());
    let token = BackendClient::new()
        .login(
            settings.auth_options.username.as_deref(),
            settings.auth_options.password.as_deref(),
            &settings.auth_options.api_key,
            &backend,
        )
        .await
        .context("Failed to login! Check your credentials and try again.")?;

    settings.jwt_token = Some(token);
    provider.save(settings)?;
    println!("Logged in successfully! Now you can access the API.");
    Ok(())
}
