//! Core type definitions for the executor

pub mod ast;
pub mod control;
pub mod values;

pub use ast::*;
pub use control::*;
pub use values::*;
