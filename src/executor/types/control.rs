//! Control flow types

use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;

use super::values::Value;
use crate::error::EngineError;

/* ===================== Control Flow ===================== */

/// Non-local transfer out of a node.
///
/// `Return`, `Break` and `Continue` are absorbed by the construct that owns
/// them; `Throw` travels to the engine boundary; `Error` is an engine fault
/// that no guest construct may absorb.
#[derive(Debug)]
pub enum Control {
    Return(Value),
    Throw(Value),
    Break(Option<Rc<str>>),
    Continue(Option<Rc<str>>),
    Error(EngineError),
}

impl From<EngineError> for Control {
    fn from(err: EngineError) -> Self {
        Control::Error(err)
    }
}

/// Outcome of evaluating one node
pub type EvalResult = Result<Value, Control>;

/// Boxed evaluation future, one per recursive step of the tree walk
pub type EvalFuture<'a> = Pin<Box<dyn Future<Output = EvalResult> + 'a>>;
