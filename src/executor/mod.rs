//! # Executor - suspendable interpreter runtime
//!
//! Pieces, leaves first:
//!
//! - [`scope`]: chained lexical environments with sealed binding sets
//! - [`call_stack`]: live activations and the capture / link / close protocol
//! - [`links`]: which scope each function value was created in
//! - [`suspension`]: the one-shot watch that fires on an unsettled pending value
//! - [`evaluator`]: the async tree walker
//! - [`stdlib`]: host functions installed on the global object

pub mod call_stack;
pub mod errors;
pub mod evaluator;
pub mod links;
pub mod pending;
pub mod scope;
pub mod stdlib;
pub mod suspension;
pub mod types;

#[cfg(test)]
mod tests;

// Re-export commonly used items
pub use evaluator::Runtime;
pub use pending::{PendingValue, Settlement, Settler};
pub use scope::{Scope, ScopeError};
pub use suspension::{StackPosition, Suspension, SuspensionBroker};
pub use types::{Control, EvalResult, FunctionRef, ObjectRef, Value};
