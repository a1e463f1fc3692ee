use reqwest::StatusCode;

#[derive(thiserror::Error, Debug)]
pub enum UpstreamError {
    #[error("Request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} responded with {status}: {body}")]
    Status { url: String, status: StatusCode, body: String },
    #[error("Failed to decode the response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("{url} reported an unsuccessful response: {messages}")]
    Unsuccessful { url: String, messages: String },
    #[error("Cannot build the request url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl UpstreamError {
    /// Transient failures worth another attempt: the network, rate limiting and any 5xx (503/504 included).
    pub fn is_retryable(&self) -> bool {
        match self {
            UpstreamError::Transport { .. } => true,
            UpstreamError::Status { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            UpstreamError::Decode { .. } | UpstreamError::Unsuccessful { .. } | UpstreamError::InvalidUrl(_) => false,
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            UpstreamError::Status { status, .. } => Some(*status),
            UpstreamError::Transport { source, .. } => source.status(),
            _ => None,
        }
    }
}
