use reqwest::StatusCode;

/// Errors returned by the session client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Not authenticated")]
    Unauthorized,
    #[error("Unexpected status: {0}")]
    Status(StatusCode),
    #[error("Invalid response body: {0}")]
    Decode(String),
    #[error("Request timed out")]
    Timeout,
    /// Refresh failed or the attempt cap was reached
    #[error("Session expired, login required")]
    LoginRequired,
}
