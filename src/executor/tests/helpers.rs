//! Test helpers for executor tests
//!
//! Common utilities for compiling programs and building engines

use std::rc::Rc;

use crate::compiler::{CompiledUnit, Program};
use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::error::EngineError;
use crate::executor::Value;

/// Call depth used by test engines; keeps runaway recursion cheap
pub const TEST_CALL_DEPTH: usize = 50;

/// Parse source, serialize/deserialize the program, then instrument it
///
/// This helper:
/// - Parses the program with the PEST grammar
/// - Serializes and deserializes the AST (to test round-trip compatibility)
/// - Runs the instrumentation pass over the round-tripped AST
pub fn compile_roundtrip(source: &str) -> Rc<CompiledUnit> {
    let program = crate::compiler::parse_program(source).expect("Parse program failed");
    let json = serde_json::to_string(&program).expect("Program serialization failed");
    let program: Program = serde_json::from_str(&json).expect("Program deserialization failed");
    Rc::new(CompiledUnit::from_program(source, program).expect("Instrumentation failed"))
}

pub fn test_config() -> EngineConfig {
    EngineConfig {
        max_call_depth: TEST_CALL_DEPTH,
        ..EngineConfig::default()
    }
}

/// Engine with the stdlib installed and a small call depth
pub fn engine() -> Engine {
    Engine::builder().name("test").config(test_config()).build()
}

/// Run `source` on `engine` through the round-trip compiler, expecting success
pub async fn run_on(engine: &Engine, source: &str) -> Value {
    match engine.run_unit(compile_roundtrip(source)).await {
        Ok(value) => value,
        Err(e) => panic!("Run failed: {}\nSource:\n{}", e, source),
    }
}

/// Run `source` on a fresh engine, expecting success
pub async fn run(source: &str) -> Value {
    run_on(&engine(), source).await
}

/// Run `source` on a fresh engine, expecting failure
pub async fn run_err(source: &str) -> EngineError {
    match engine().run(source).await {
        Ok(value) => panic!("Expected failure, got {:?}\nSource:\n{}", value, source),
        Err(e) => e,
    }
}

/// Read a global binding
pub fn global(engine: &Engine, name: &str) -> Value {
    engine.global().get(name).unwrap_or_default()
}
