use http::Method;
use thiserror::Error;

use crate::outcome::Outcome;
use crate::util::truncate_body;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TransportErrorKind {
    Dns,
    Connect,
    Tls,
    Read,
    Other,
}

impl std::fmt::Display for TransportErrorKind {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Dns => "dns",
            Self::Connect => "connect",
            Self::Tls => "tls",
            Self::Read => "read",
            Self::Other => "other",
        };
        formatter.write_str(text)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorCode {
    InvalidUri,
    InvalidHeaderName,
    InvalidHeaderValue,
    RequestBuild,
    SerializeJson,
    Intercepted,
    BodyReplay,
    Transport,
    DeadlineExceeded,
    Cancelled,
    ReadBody,
    ResponseBodyTooLarge,
    WorkerAborted,
    Rejected,
    Deserialize,
    Custom,
}

impl ErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidUri => "invalid_uri",
            Self::InvalidHeaderName => "invalid_header_name",
            Self::InvalidHeaderValue => "invalid_header_value",
            Self::RequestBuild => "request_build",
            Self::SerializeJson => "serialize_json",
            Self::Intercepted => "intercepted",
            Self::BodyReplay => "body_replay",
            Self::Transport => "transport",
            Self::DeadlineExceeded => "deadline_exceeded",
            Self::Cancelled => "cancelled",
            Self::ReadBody => "read_body",
            Self::ResponseBodyTooLarge => "response_body_too_large",
            Self::WorkerAborted => "worker_aborted",
            Self::Rejected => "rejected",
            Self::Deserialize => "deserialize",
            Self::Custom => "custom",
        }
    }

    /// Errors raised before any network I/O for the target.
    pub const fn is_build_error(self) -> bool {
        matches!(
            self,
            Self::InvalidUri
                | Self::InvalidHeaderName
                | Self::InvalidHeaderValue
                | Self::RequestBuild
                | Self::SerializeJson
                | Self::Intercepted
                | Self::BodyReplay
        )
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid request uri: {uri}")]
    InvalidUri { uri: String },
    #[error("invalid header name {name}: {source}")]
    InvalidHeaderName {
        name: String,
        #[source]
        source: http::header::InvalidHeaderName,
    },
    #[error("invalid header value for {name}: {source}")]
    InvalidHeaderValue {
        name: String,
        #[source]
        source: http::header::InvalidHeaderValue,
    },
    #[error("failed to build http request: {source}")]
    RequestBuild {
        #[source]
        source: http::Error,
    },
    #[error("failed to serialize request json: {source}")]
    SerializeJson {
        #[source]
        source: serde_json::Error,
    },
    #[error("request for target {index} rejected by interceptor: {source}")]
    Intercepted {
        index: usize,
        #[source]
        source: BoxError,
    },
    #[error("failed to open a fresh request body for {method} {uri}: {source}")]
    BodyReplay {
        method: Method,
        uri: String,
        #[source]
        source: BoxError,
    },
    #[error("http transport error ({kind}) for {method} {uri}: {source}")]
    Transport {
        kind: TransportErrorKind,
        method: Method,
        uri: String,
        #[source]
        source: BoxError,
    },
    #[error("batch deadline exceeded after {timeout_ms}ms for {method} {uri}")]
    DeadlineExceeded {
        timeout_ms: u128,
        method: Method,
        uri: String,
    },
    #[error("batch cancelled before {method} {uri} completed")]
    Cancelled { method: Method, uri: String },
    #[error("failed to read response body: {source}")]
    ReadBody {
        #[source]
        source: BoxError,
    },
    #[error(
        "response body too large ({actual_bytes} bytes > {limit_bytes} bytes) for {method} {uri}"
    )]
    ResponseBodyTooLarge {
        limit_bytes: usize,
        actual_bytes: usize,
        method: Method,
        uri: String,
    },
    #[error("worker for {method} {uri} stopped without reporting an outcome")]
    WorkerAborted { method: Method, uri: String },
    #[error("response {status} rejected for {method} {uri}: {body}")]
    Rejected {
        status: u16,
        method: Method,
        uri: String,
        body: String,
    },
    #[error("failed to decode response json: {source}; body={body}")]
    Deserialize {
        #[source]
        source: serde_json::Error,
        body: String,
    },
    #[error("{source}")]
    Custom {
        #[source]
        source: BoxError,
    },
}

impl Error {
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidUri { .. } => ErrorCode::InvalidUri,
            Self::InvalidHeaderName { .. } => ErrorCode::InvalidHeaderName,
            Self::InvalidHeaderValue { .. } => ErrorCode::InvalidHeaderValue,
            Self::RequestBuild { .. } => ErrorCode::RequestBuild,
            Self::SerializeJson { .. } => ErrorCode::SerializeJson,
            Self::Intercepted { .. } => ErrorCode::Intercepted,
            Self::BodyReplay { .. } => ErrorCode::BodyReplay,
            Self::Transport { .. } => ErrorCode::Transport,
            Self::DeadlineExceeded { .. } => ErrorCode::DeadlineExceeded,
            Self::Cancelled { .. } => ErrorCode::Cancelled,
            Self::ReadBody { .. } => ErrorCode::ReadBody,
            Self::ResponseBodyTooLarge { .. } => ErrorCode::ResponseBodyTooLarge,
            Self::WorkerAborted { .. } => ErrorCode::WorkerAborted,
            Self::Rejected { .. } => ErrorCode::Rejected,
            Self::Deserialize { .. } => ErrorCode::Deserialize,
            Self::Custom { .. } => ErrorCode::Custom,
        }
    }

    /// Wraps an arbitrary error returned from a response handler or interceptor.
    pub fn custom<E>(source: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::Custom {
            source: source.into(),
        }
    }

    /// Builds the error a handler returns when an outcome's status is not acceptable.
    pub fn rejected(outcome: &Outcome) -> Self {
        Self::Rejected {
            status: outcome.status().map_or(0, |status| status.as_u16()),
            method: outcome.request().method().clone(),
            uri: outcome.request().redacted_uri(),
            body: truncate_body(outcome.body()),
        }
    }
}

/// Every per-target failure collected by a reducer.
#[derive(Debug)]
pub struct AggregateError {
    errors: Vec<Error>,
    dispatched: usize,
    interrupted: bool,
}

impl AggregateError {
    pub(crate) fn new(errors: Vec<Error>, dispatched: usize, interrupted: bool) -> Self {
        Self {
            errors,
            dispatched,
            interrupted,
        }
    }

    pub fn errors(&self) -> &[Error] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<Error> {
        self.errors
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn dispatched(&self) -> usize {
        self.dispatched
    }

    /// True when the batch was cancelled or hit its deadline before every outcome arrived.
    pub fn is_interrupted(&self) -> bool {
        self.interrupted
    }

    pub fn codes(&self) -> Vec<ErrorCode> {
        self.errors.iter().map(Error::code).collect()
    }
}

impl std::fmt::Display for AggregateError {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            formatter,
            "{} of {} targets failed",
            self.errors.len(),
            self.dispatched
        )?;
        if self.interrupted {
            formatter.write_str(" (batch interrupted)")?;
        }
        if let Some(first) = self.errors.first() {
            write!(formatter, "; first error: {first}")?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateError {}
