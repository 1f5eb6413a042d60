use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::utils::is_truthy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

/// Body of `POST /api/downloadFile`.
///
/// Quality and override fields are always sent as `null` so the backend picks
/// its own defaults.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadFileBody {
    pub url: String,
    pub custom_quality_configuration: Option<String>,
    pub custom_args: Option<String>,
    pub additional_args: Option<String>,
    pub custom_output: Option<String>,
    pub youtube_username: Option<String>,
    pub youtube_password: Option<String>,
    pub selected_height: Option<String>,
    pub max_height: Option<String>,
    pub max_bitrate: Option<String>,
    #[serde(rename = "type")]
    pub media_kind: MediaKind,
}

impl DownloadFileBody {
    pub fn audio(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            custom_quality_configuration: None,
            custom_args: None,
            additional_args: None,
            custom_output: None,
            youtube_username: None,
            youtube_password: None,
            selected_height: None,
            max_height: None,
            max_bitrate: None,
            media_kind: MediaKind::Audio,
        }
    }
}

/// Body of `POST /api/download`.
#[derive(Debug, Clone, Serialize)]
pub struct DownloadStatusBody<'a> {
    pub download_uid: &'a str,
}

/// Body of `POST /api/auth/login`.
#[derive(Debug, Clone, Serialize)]
pub struct LoginBody<'a> {
    pub username: Option<&'a str>,
    pub password: Option<&'a str>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    #[serde(default)]
    pub token: Option<String>,
}

/// Whatever the backend returned for an accepted download, already unwrapped
/// from its `download` envelope.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct DownloadAcceptance(pub Value);

impl DownloadAcceptance {
    /// The download identifier, if the backend handed one out.
    pub fn download_id(&self) -> Option<&str> {
        self.0.get("uid").and_then(Value::as_str)
    }

    pub fn has_error(&self) -> bool {
        self.0.get("error").is_some_and(is_truthy)
    }
}

/// Snapshot of a download's progress as reported by `POST /api/download`.
///
/// Every field is optional on the wire; missing or `null` values fall back to
/// their defaults so that a bare `{"error": ...}` still parses. Only `error`
/// and `finished` drive polling, the rest is read leniently and never fails
/// the whole snapshot.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct DownloadStatusResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub finished: bool,
    #[serde(default, deserialize_with = "lenient")]
    pub finished_step: bool,
    #[serde(default, deserialize_with = "lenient")]
    pub paused: bool,
    #[serde(default, deserialize_with = "lenient_number")]
    pub percent_complete: f64,
    #[serde(default, deserialize_with = "lenient")]
    pub running: bool,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub step_index: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_start: Option<Value>,
    #[serde(
        rename = "type",
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub media_kind: Option<MediaKind>,
    #[serde(default, deserialize_with = "lenient")]
    pub url: String,
    #[serde(default, deserialize_with = "lenient")]
    pub uid: String,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub user_uid: Option<String>,
}

impl DownloadStatusResponse {
    pub fn has_error(&self) -> bool {
        self.error.as_ref().is_some_and(is_truthy)
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Any value of the wrong shape reads as the default.
fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

/// A number, or a string holding one (`"45.20"`).
fn lenient_number<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let number = match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    Ok(number.filter(|n: &f64| n.is_finite()).unwrap_or_default())
}
