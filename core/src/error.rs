use thiserror::Error;

/// Failures surfaced by the gateway and everything layered on it.
///
/// The type is `Clone` so a single refresh outcome can be handed to every
/// request waiting on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("{0}")]
    Transport(String),
    #[error("request timed out")]
    Timeout,
    #[error("{message}")]
    Backend { code: String, message: String },
    /// The backend rejected the presented credential (HTTP 401).
    #[error("{0}")]
    Unauthorized(String),
    /// The refresh protocol ran and failed; the session has been cleared.
    #[error("{0}")]
    RefreshFailed(String),
    #[error("invalid response: {0}")]
    Decode(String),
    #[error("{0}")]
    Validation(String),
    #[error("credential storage failed: {0}")]
    Storage(String),
}

impl ApiError {
    /// Human-readable text suitable for an `error` field in UI state.
    pub fn message(&self) -> String {
        self.to_string()
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }

    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode credential record: {0}")]
    Encode(#[from] serde_json::Error),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self::Storage(err.to_string())
    }
}
