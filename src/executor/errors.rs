//! Guest-visible error kinds and error snapshots

use serde::{Deserialize, Serialize};

pub const ERROR: &str = "Error";
pub const TYPE_ERROR: &str = "TypeError";
pub const REFERENCE_ERROR: &str = "ReferenceError";
pub const RANGE_ERROR: &str = "RangeError";
pub const SYNTAX_ERROR: &str = "SyntaxError";

/// Thrown value that is not an error object
pub const UNCAUGHT: &str = "Uncaught";

/// Every constructor name the stdlib installs for guest errors
pub const KINDS: [&str; 5] = [ERROR, TYPE_ERROR, REFERENCE_ERROR, RANGE_ERROR, SYNTAX_ERROR];

/// Error code and message, detached from any engine heap
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{}: {}", self.code, self.message)
        }
    }
}
