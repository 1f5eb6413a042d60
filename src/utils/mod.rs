use serde_json::Value;
use url::Url;

const YOUTUBE_HOSTS: [&str; 2] = ["www.youtube.com", "youtube.com"];

/// Check whether a URL points at a single YouTube video page
/// (`youtube.com/watch?v=...`)
pub fn is_youtube_watch_url(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };

    let host_ok = parsed
        .host_str()
        .is_some_and(|host| YOUTUBE_HOSTS.contains(&host));

    host_ok && parsed.path() == "/watch" && parsed.query_pairs().any(|(key, _)| key == "v")
}

/// Loose truthiness of a JSON value, the way the backend's flags are meant
/// to be read: `null`, `false`, `0` and `""` are false
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
