pub mod cli;
pub mod compiler;
pub mod config;
pub mod engine;
pub mod error;
pub mod executor;

// Re-export main types
pub use config::EngineConfig;
pub use engine::{Engine, EngineBuilder, SuspensionRecord};
pub use error::{EngineError, EngineResult, GuestFailure};
pub use executor::{ObjectRef, PendingValue, Scope, Settlement, Settler, Value};
