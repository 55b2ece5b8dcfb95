//! Error Handling Module
//!
//! This module provides the error type shared by every engine component:
//! - Core error types (`LlmError`, `ErrorCategory`)
//! - Type conversions from common error types
//!
//! # Example
//!
//! ```rust,ignore
//! use siumai_engine::error::{LlmError, ErrorCategory};
//!
//! let error = LlmError::api_error(404, "Not found");
//! assert_eq!(error.category(), ErrorCategory::Client);
//! assert!(!error.is_retryable());
//! ```

mod conversions;
pub mod types;

pub use types::*;
