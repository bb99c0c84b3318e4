use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid request url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("prometheus request to {url} failed: {source}")]
    ConnectionFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to decode prometheus response from {url}: {source}")]
    DecodeFailed {
        url: String,
        status: u16,
        body: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{0}")]
    Unexpected(String),
}

impl Error {
    /// Stable label used for metrics and structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidUrl { .. } => "invalid_url",
            Self::ConnectionFailed { .. } => "connection_failed",
            Self::DecodeFailed { .. } => "decode_failed",
            Self::Unexpected(_) => "unexpected",
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        Self::Unexpected(value.to_string())
    }
}
