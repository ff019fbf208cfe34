use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Network unavailable: {0}")]
    Offline(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

/// Maximum length for response bodies quoted in log lines
const MAX_LOGGED_BODY_LENGTH: usize = 200;

/// Truncate a response body to avoid logging excessive data
pub(crate) fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_LOGGED_BODY_LENGTH {
        body.to_string()
    } else {
        let cut: String = body.chars().take(MAX_LOGGED_BODY_LENGTH).collect();
        format!("{}... (truncated, {} total bytes)", cut, body.len())
    }
}
