use thiserror::Error;

/// Failures raised by the HTTP collaborators (RPC endpoints, settlement API, store)
#[derive(Debug, Error)]
pub enum ClientError {
    /// Connection, timeout or body transfer failure
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-2xx response
    #[error("{url} returned status {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    /// Login rejected or session could not be re-established
    #[error("Authentication failed against {url}: {message}")]
    Auth { url: String, message: String },

    /// Response body did not have the expected shape
    #[error("Failed to decode response from {url}: {message}")]
    Decode { url: String, message: String },

    /// JSON-RPC level error returned by a chain endpoint
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },
}

impl ClientError {
    pub fn decode(url: impl Into<String>, message: impl ToString) -> Self {
        ClientError::Decode {
            url: url.into(),
            message: message.to_string(),
        }
    }

    /// Short label used for the error metric
    pub fn kind(&self) -> &'static str {
        match self {
            ClientError::Transport(_) => "transport",
            ClientError::Status { .. } => "status",
            ClientError::Auth { .. } => "auth",
            ClientError::Decode { .. } => "decode",
            ClientError::Rpc { .. } => "rpc",
        }
    }
}
