//! Error types for the orchestration core.
//!
//! Errors carry their cause chain explicitly: [`Error::Context`] layers add
//! operation context and [`Error::Permanent`] marks a failure the retry engine
//! must not retry. Both are inspected by structural matching, never by
//! downcasting.

use thiserror::Error;

/// Result type alias for orchestration operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the orchestration core.
#[derive(Error, Debug)]
pub enum Error {
    /// Transport level failures talking to a cluster member.
    #[error("network error: {0}")]
    Network(#[from] NetworkError),

    /// The server rejected the credentials (HTTP 401).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The server answered with a status the caller did not expect.
    #[error("unexpected status {status} from {endpoint}: {message}")]
    UnexpectedStatus {
        endpoint: String,
        status: u16,
        message: String,
    },

    /// The response body could not be decoded.
    #[error("malformed response from {endpoint}: {source}")]
    MalformedResponse {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },

    /// Configuration errors (missing secret, empty endpoint set, unknown member).
    #[error("config error: {0}")]
    Config(String),

    /// The cluster has not reached the awaited state yet.
    #[error("not ready: {0}")]
    NotReady(String),

    /// The enclosing scope was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// The operation ran past its deadline.
    #[error("operation timed out")]
    Timeout,

    /// An error wrapped with operation context.
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<Error>,
    },

    /// An error the retry engine must not retry.
    #[error(transparent)]
    Permanent(Box<Error>),

    /// Generic internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Network communication errors.
#[derive(Error, Debug)]
pub enum NetworkError {
    /// The HTTP request could not be completed.
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    /// An endpoint could not be turned into a URL.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// The HTTP client could not be constructed.
    #[error("http client setup failed: {0}")]
    ClientSetup(#[source] reqwest::Error),
}

impl Error {
    /// Wrap this error with operation context, keeping it as the cause.
    pub fn context(self, context: impl Into<String>) -> Self {
        Error::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Mark this error as permanent so retries stop immediately.
    pub fn permanent(self) -> Self {
        match self {
            Error::Permanent(_) => self,
            other => Error::Permanent(Box::new(other)),
        }
    }

    /// Check whether a permanent marker exists anywhere in the context chain.
    pub fn is_permanent(&self) -> bool {
        match self {
            Error::Permanent(_) => true,
            Error::Context { source, .. } => source.is_permanent(),
            _ => false,
        }
    }

    /// Unwrap the cause of a permanent error.
    ///
    /// Context layers above the permanent marker are discarded; the error
    /// that was marked permanent is returned. Non-permanent errors come back
    /// unchanged in `Err`.
    pub fn into_permanent(self) -> std::result::Result<Error, Error> {
        if !self.is_permanent() {
            return Err(self);
        }
        let mut current = self;
        loop {
            match current {
                Error::Permanent(cause) => return Ok(*cause),
                Error::Context { source, .. } => current = *source,
                other => return Err(other),
            }
        }
    }

    /// Check whether the chain ends in an authorization failure.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self.root(), Error::Unauthorized(_))
    }

    /// Check whether the chain ends in a cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.root(), Error::Cancelled)
    }

    /// Check whether the chain ends in a timeout.
    pub fn is_timeout(&self) -> bool {
        match self.root() {
            Error::Timeout => true,
            Error::Network(NetworkError::Transport { source, .. }) => source.is_timeout(),
            _ => false,
        }
    }

    /// HTTP status carried by the innermost error, if any.
    pub fn status(&self) -> Option<u16> {
        match self.root() {
            Error::Unauthorized(_) => Some(401),
            Error::UnexpectedStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The innermost error below all context and permanent layers.
    pub fn root(&self) -> &Error {
        match self {
            Error::Context { source, .. } => source.root(),
            Error::Permanent(cause) => cause.root(),
            other => other,
        }
    }
}

/// Context wrapping for results.
pub trait ResultExt<T> {
    /// Wrap the error, if any, with operation context.
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Wrap the error, if any, with lazily built context.
    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Into<String>,
        F: FnOnce() -> C;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(context))
    }

    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Into<String>,
        F: FnOnce() -> C,
    {
        self.map_err(|e| e.context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permanent_detected_through_context() {
        let err = Error::Config("bad".into())
            .permanent()
            .context("reading plan")
            .context("collecting distribution");

        assert!(err.is_permanent());
        let cause = err.into_permanent().unwrap();
        assert!(matches!(cause, Error::Config(ref m) if m == "bad"));
    }

    #[test]
    fn test_non_permanent_returned_unchanged() {
        let err = Error::Timeout.context("probe");
        assert!(!err.is_permanent());

        let back = err.into_permanent().unwrap_err();
        assert!(back.is_timeout());
        assert_eq!(back.to_string(), "probe: operation timed out");
    }

    #[test]
    fn test_permanent_is_idempotent() {
        let err = Error::Cancelled.permanent().permanent();
        match err {
            Error::Permanent(inner) => assert!(matches!(*inner, Error::Cancelled)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_unauthorized_and_status() {
        let err = Error::Unauthorized("token expired".into()).context("version probe");
        assert!(err.is_unauthorized());
        assert_eq!(err.status(), Some(401));

        let err = Error::UnexpectedStatus {
            endpoint: "http://a:8529".into(),
            status: 503,
            message: "leader not available".into(),
        };
        assert!(!err.is_unauthorized());
        assert_eq!(err.status(), Some(503));
    }

    #[test]
    fn test_result_ext_context() {
        let res: Result<()> = Err(Error::Internal("boom".into()));
        let err = res.with_context(|| format!("member {}", "PRMR-1")).unwrap_err();
        assert_eq!(err.to_string(), "member PRMR-1: internal error: boom");
    }
}
