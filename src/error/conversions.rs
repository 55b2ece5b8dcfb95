//! Type Conversions for LlmError
//!
//! This module contains From trait implementations for converting
//! common error types into LlmError.

use super::types::LlmError;
use std::io::ErrorKind;

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self::TimeoutError(format!("Request timed out: {err}"));
        }
        if let Some(kind) = io_kind_in_chain(&err)
            && is_transient_io(kind)
        {
            return Self::ConnectionError(format!("Connection error: {err}"));
        }
        // DNS resolution and TLS handshake failures land here and are final.
        if err.is_connect() {
            return Self::HttpError(format!("Connection failed: {err}"));
        }
        Self::HttpError(err.to_string())
    }
}

impl From<serde_json::Error> for LlmError {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonError(err.to_string())
    }
}

impl From<std::io::Error> for LlmError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            ErrorKind::TimedOut => Self::TimeoutError(err.to_string()),
            kind if is_transient_io(kind) => Self::ConnectionError(err.to_string()),
            _ => Self::IoError(err.to_string()),
        }
    }
}

/// Connection-level IO failures that are worth another attempt.
pub(crate) fn is_transient_io(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::TimedOut
            | ErrorKind::UnexpectedEof
    )
}

fn io_kind_in_chain(err: &(dyn std::error::Error + 'static)) -> Option<ErrorKind> {
    let mut source = err.source();
    while let Some(inner) = source {
        if let Some(io) = inner.downcast_ref::<std::io::Error>() {
            return Some(io.kind());
        }
        source = inner.source();
    }
    None
}
