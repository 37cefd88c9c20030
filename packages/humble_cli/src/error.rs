use reqwest::StatusCode;
use thiserror::Error;

/// Failures of calls to the purchase API
#[derive(Debug, Error)]
pub enum ApiError {
    /// Transport failure or non-2xx status
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The payload did not have the expected shape
    #[error("cannot parse the response: {0}")]
    Deserialize(#[from] serde_json::Error),

    /// Data expected on a page is missing
    #[error("cannot find any data")]
    BundleNotFound,

    /// A batch task panicked or was aborted
    #[error("fetch task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl ApiError {
    /// HTTP status behind a network error, if the server answered
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Network(e) => e.status(),
            _ => None,
        }
    }
}

/// Wraps an API error with a hint for the statuses users can act on.
///
/// The original error stays in the chain, so its kind is unchanged.
pub fn explain(err: ApiError) -> anyhow::Error {
    let hint = match err.status() {
        Some(StatusCode::UNAUTHORIZED) => {
            Some("Unauthorized request (401). Is the session key correct?")
        }
        Some(StatusCode::NOT_FOUND) => Some("Bundle not found (404). Is the bundle key correct?"),
        _ => None,
    };

    match hint {
        Some(hint) => anyhow::Error::new(err).context(hint),
        None => anyhow::Error::new(err).context("request failed"),
    }
}
