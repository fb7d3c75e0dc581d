//! Engine-level failures
//!
//! Guest exceptions travel as guest values while evaluation is in flight;
//! once one reaches the engine boundary it is snapshotted into a
//! [`GuestFailure`] so the error can leave the single-threaded engine.

use thiserror::Error;

use crate::compiler::CompileError;
use crate::executor::errors::{self, ErrorInfo};
use crate::executor::types::ast::NodeId;

/// A guest `throw` that nothing absorbed
#[derive(Debug, Clone, PartialEq)]
pub struct GuestFailure {
    pub info: ErrorInfo,
    /// JSON rendering of the thrown value
    pub value: serde_json::Value,
}

impl GuestFailure {
    pub fn kind(&self) -> &str {
        &self.info.code
    }

    pub fn message(&self) -> &str {
        &self.info.message
    }

    pub fn is_kind(&self, kind: &str) -> bool {
        self.info.code == kind
    }

    pub fn is_type_error(&self) -> bool {
        self.is_kind(errors::TYPE_ERROR)
    }

    pub fn is_reference_error(&self) -> bool {
        self.is_kind(errors::REFERENCE_ERROR)
    }
}

impl std::fmt::Display for GuestFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.info)
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("compile error: {0}")]
    Compile(#[from] CompileError),

    #[error("uncaught {0}")]
    Uncaught(GuestFailure),

    #[error("unsupported construct: {0}")]
    Unsupported(String),

    #[error("link desync in {function} ({node}): {detail}")]
    LinkDesync {
        function: String,
        node: NodeId,
        detail: String,
    },

    #[error("call stack desync: {0}")]
    StackDesync(String),

    #[error("pending value touched twice in one suspension cycle")]
    DoubleSuspension,

    #[error("suspended evaluation lost its resume channel")]
    SuspensionLost,

    #[error("engine is already evaluating")]
    Busy,

    #[error("{0} is not a function")]
    NotCallable(String),

    #[error("scope belongs to another engine")]
    ForeignScope,
}

impl EngineError {
    /// The guest failure carried by an `Uncaught` error
    pub fn guest(&self) -> Option<&GuestFailure> {
        match self {
            EngineError::Uncaught(failure) => Some(failure),
            _ => None,
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
