use reqwest::StatusCode;

/// Errors from a single provider request.
///
/// Streaming generation never surfaces these to callers (a failed stream just
/// ends), but the catalog lookup keeps them around so failures can be logged.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("request to provider failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned status {0}")]
    Status(StatusCode),

    #[error("invalid provider response: {0}")]
    Json(#[from] serde_json::Error),
}
