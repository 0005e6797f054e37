use {
    crate::Index,
    reqwest::StatusCode,
    serde::Deserialize,
    std::fmt,
};

///
/// Error codes returned by the service in the `errorCode` field of an error body.
///
pub mod code {
    pub const KEY_NOT_FOUND: u64 = 100;
    pub const COMPARE_FAILED: u64 = 101;
    pub const NOT_FILE: u64 = 102;
    pub const NOT_DIR: u64 = 104;
    pub const NODE_EXIST: u64 = 105;
    pub const ROOT_READ_ONLY: u64 = 107;
    pub const DIR_NOT_EMPTY: u64 = 108;

    pub const PREV_VALUE_REQUIRED: u64 = 201;
    pub const TTL_NAN: u64 = 202;
    pub const INDEX_NAN: u64 = 203;
    pub const INVALID_FIELD: u64 = 209;
    pub const INVALID_FORM: u64 = 210;

    pub const RAFT_INTERNAL: u64 = 300;
    pub const LEADER_ELECT: u64 = 301;

    pub const WATCHER_CLEARED: u64 = 400;
    pub const EVENT_INDEX_CLEARED: u64 = 401;
}

///
/// Structured error reported by the service in the body of a non-2xx response.
///
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientError {
    pub message: String,
    #[serde(rename = "errorCode", default)]
    pub error_code: u64,
    #[serde(default)]
    pub cause: Option<String>,
    #[serde(default)]
    pub index: Option<Index>,
}

impl ClientError {
    pub fn is_key_not_found(&self) -> bool {
        self.error_code == code::KEY_NOT_FOUND
    }

    pub fn is_compare_failed(&self) -> bool {
        self.error_code == code::COMPARE_FAILED
    }

    pub fn is_node_exist(&self) -> bool {
        self.error_code == code::NODE_EXIST
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {}", self.message, self.error_code)?;
        if let Some(cause) = &self.cause {
            write!(f, ", cause {cause}")?;
        }
        if let Some(index) = self.index {
            write!(f, ", index {index}")?;
        }
        f.write_str(")")
    }
}

impl std::error::Error for ClientError {}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("http error: {0}")]
    Http(reqwest::Error),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else {
            TransportError::Http(e)
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("service error: {0}")]
    Service(#[from] ClientError),
    #[error("bad status: {}", .0.as_u16())]
    BadStatus(StatusCode),
    #[error("malformed response body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("redirect response without a location header")]
    MissingRedirectLocation,
    #[error("too many redirects, last location: {0}")]
    TooManyRedirects(String),
}

impl Error {
    ///
    /// True when the underlying transport gave up waiting for the response.
    ///
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Transport(TransportError::Timeout))
    }

    pub fn as_client_error(&self) -> Option<&ClientError> {
        match self {
            Error::Service(e) => Some(e),
            _ => None,
        }
    }

    pub fn error_code(&self) -> Option<u64> {
        self.as_client_error().map(|e| e.error_code)
    }
}
