use std::fmt;

/// Category of a collaborator error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid configuration. Permanent, fails startup.
    Config,
    /// I/O or network error. Transient, may be retried.
    Io,
    /// Undecodable input; the record is skipped.
    Format,
    /// Logical error (invalid state, generic).
    Logic,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Config => f.write_str("config"),
            ErrorKind::Io => f.write_str("io"),
            ErrorKind::Format => f.write_str("format"),
            ErrorKind::Logic => f.write_str("logic"),
        }
    }
}

/// Unified error type returned by every collaborator trait
/// (log, latest-value store, time-series store, dead letters).
///
/// Carries an `ErrorKind` and a human-readable message. `From` impls
/// assign the kind automatically so adapters can use `?`.
#[derive(Clone, PartialEq, Eq)]
pub struct FeedError {
    kind: ErrorKind,
    message: String,
}

impl FeedError {
    /// Generic logic error (default kind).
    pub fn new(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Logic, message: msg.into() }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Config, message: msg.into() }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Io, message: msg.into() }
    }

    pub fn format_err(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Format, message: msg.into() }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Add context to the error, preserving the original kind.
    ///
    /// Produces: `"context: original message"`.
    pub fn with_context(self, ctx: impl fmt::Display) -> Self {
        Self {
            kind: self.kind,
            message: format!("{ctx}: {}", self.message),
        }
    }
}

impl fmt::Debug for FeedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

impl fmt::Display for FeedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for FeedError {}

impl From<String> for FeedError {
    fn from(s: String) -> Self { Self::new(s) }
}

impl From<&str> for FeedError {
    fn from(s: &str) -> Self { Self::new(s) }
}

impl From<std::io::Error> for FeedError {
    fn from(e: std::io::Error) -> Self { Self::io(e.to_string()) }
}

impl From<serde_json::Error> for FeedError {
    fn from(e: serde_json::Error) -> Self { Self::format_err(e.to_string()) }
}

impl From<std::str::Utf8Error> for FeedError {
    fn from(e: std::str::Utf8Error) -> Self { Self::format_err(e.to_string()) }
}

impl From<std::string::FromUtf8Error> for FeedError {
    fn from(e: std::string::FromUtf8Error) -> Self { Self::format_err(e.to_string()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_keeps_kind() {
        let err = FeedError::io("connection refused").with_context("redis ping");
        assert_eq!(err.kind(), ErrorKind::Io);
        assert_eq!(err.to_string(), "redis ping: connection refused");
        assert_eq!(format!("{err:?}"), "[io] redis ping: connection refused");
    }

    #[test]
    fn json_errors_are_format_errors() {
        let err: FeedError = serde_json::from_str::<serde_json::Value>("{").unwrap_err().into();
        assert_eq!(err.kind(), ErrorKind::Format);
    }
}
