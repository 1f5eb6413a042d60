pub mod client;
pub mod models;

pub use client::{Backend, BackendClient, BackendError, Result};
pub use models::{DownloadAcceptance, DownloadStatusResponse, MediaKind};
