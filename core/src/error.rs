//! Error types for the request/response capture layer.
//!
//! # Design
//! Every failure is returned as a value. `InvalidArgument` is raised before
//! any engine interaction, so callers can tell "bad call" apart from "the
//! engine could not complete the transfer". Engine failures carry a
//! `TransportCode` plus the engine's own message; the code is opaque to this
//! layer and only passed through for diagnostics.

use std::fmt;

/// Classification of an engine-reported failure.
///
/// The discriminants are stable and exposed over the C ABI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum TransportCode {
    Other = 1,
    MalformedUrl = 3,
    Proxy = 5,
    HostNotFound = 6,
    ConnectFailed = 7,
    Timeout = 28,
    Tls = 35,
    Io = 56,
}

impl TransportCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for TransportCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportCode::Other => "other",
            TransportCode::MalformedUrl => "malformed url",
            TransportCode::HostNotFound => "host not found",
            TransportCode::ConnectFailed => "connect failed",
            TransportCode::Proxy => "proxy",
            TransportCode::Io => "io",
            TransportCode::Timeout => "timeout",
            TransportCode::Tls => "tls",
        };
        f.write_str(name)
    }
}

/// Errors returned by `execute`, `follow_redirect` and buffer appends.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    /// Missing or empty method/url, or an option that cannot be applied.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An accumulator could not grow. Previously accumulated bytes are intact.
    #[error("out of memory: cannot grow response buffer to {requested} bytes")]
    OutOfMemory { requested: usize },

    /// The engine failed to complete the transfer.
    #[error("transport failure ({code}): {message}")]
    TransportFailure { code: TransportCode, message: String },

    /// Following one more redirect would exceed the chain cap.
    #[error("too many redirects (max {max})")]
    TooManyRedirects { max: u32 },
}

impl HttpError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        HttpError::InvalidArgument(msg.into())
    }

    pub fn transport(code: TransportCode, message: impl Into<String>) -> Self {
        HttpError::TransportFailure {
            code,
            message: message.into(),
        }
    }

    /// Stable numeric category, `0` being reserved for success.
    pub fn code(&self) -> i32 {
        match self {
            HttpError::InvalidArgument(_) => 1,
            HttpError::OutOfMemory { .. } => 2,
            HttpError::TransportFailure { .. } => 3,
            HttpError::TooManyRedirects { .. } => 4,
        }
    }

    /// Engine-specific code for transport failures, `None` otherwise.
    pub fn transport_code(&self) -> Option<TransportCode> {
        match self {
            HttpError::TransportFailure { code, .. } => Some(*code),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_failure_display_includes_code_and_message() {
        let err = HttpError::transport(TransportCode::Timeout, "operation timed out");
        assert_eq!(err.to_string(), "transport failure (timeout): operation timed out");
        assert_eq!(err.transport_code(), Some(TransportCode::Timeout));
    }

    #[test]
    fn non_transport_errors_have_no_code() {
        assert_eq!(HttpError::invalid("method").transport_code(), None);
        assert_eq!(HttpError::TooManyRedirects { max: 10 }.transport_code(), None);
    }

    #[test]
    fn transport_codes_are_stable() {
        assert_eq!(TransportCode::Timeout.as_i32(), 28);
        assert_eq!(TransportCode::HostNotFound.as_i32(), 6);
        assert_eq!(HttpError::OutOfMemory { requested: 8 }.code(), 2);
        assert_eq!(HttpError::TooManyRedirects { max: 10 }.code(), 4);
    }
}
