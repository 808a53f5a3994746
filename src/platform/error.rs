use thiserror::Error;

/// Failure of a call to the remote platform, after local retries.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// Non-2xx response other than 429.
    #[error("API {status}: {body}")]
    Status { status: u16, body: String },

    /// Transport failures outlasted the attempt budget.
    #[error("API timeout after {attempts} attempts: {message}")]
    Timeout { attempts: u32, message: String },

    /// Every attempt was answered with 429.
    #[error("API rate limited after {attempts} attempts")]
    RateLimited { attempts: u32 },

    #[error("invalid response body: {0}")]
    Decode(String),

    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),
}

impl From<serde_json::Error> for PlatformError {
    fn from(error: serde_json::Error) -> Self {
        PlatformError::Decode(error.to_string())
    }
}
