use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Timeout,
    Connect,
    Body,
    Request,
}

impl TransportErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportErrorKind::Timeout => "timeout",
            TransportErrorKind::Connect => "connect",
            TransportErrorKind::Body => "body",
            TransportErrorKind::Request => "request",
        }
    }
}

/// Failure below the HTTP layer: connect, timeout, DNS, body read.
#[derive(Debug, Clone, Error)]
#[error("{}: {message}", .kind.as_str())]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            TransportErrorKind::Timeout
        } else if err.is_connect() {
            TransportErrorKind::Connect
        } else if err.is_body() || err.is_decode() {
            TransportErrorKind::Body
        } else {
            TransportErrorKind::Request
        };
        TransportError::new(kind, err.to_string())
    }
}

/// Outcome of a fetch or form post that did not yield a usable body.
///
/// `Status` and `Transport` are terminal on the first attempt. Only a 503
/// is retried, and running out of attempts on it is `RetriesExhausted`.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("{url} still unavailable after {attempts} attempts")]
    RetriesExhausted { url: String, attempts: u32 },

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: TransportError,
    },

    #[error("partial response from {url} has no `{region}` update")]
    MissingUpdate { url: String, region: &'static str },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("job {job_id}: detail page has no title")]
    MissingTitle { job_id: String },
}

/// Why a single posting produced no record. Never aborts the run.
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl PipelineError {
    pub fn label(&self) -> &'static str {
        match self {
            PipelineError::Fetch(_) => "fetch_failed",
            PipelineError::Parse(_) => "parse_failed",
        }
    }
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("output io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Conditions that stop the whole run.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("first listing page unavailable: {0}")]
    FirstPage(#[source] FetchError),

    #[error("failed to build http client: {0}")]
    Client(String),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error("crawler task join error: {0}")]
    Join(String),
}
