//! Tests for guest failures and engine faults

use std::rc::Rc;

use super::helpers::{compile_roundtrip, engine, run_err};
use crate::compiler::CompiledUnit;
use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::error::EngineError;
use crate::executor::types::NodeId;
use crate::executor::{errors, Value};
use serde_json::json;

/* ===================== Guest Failures ===================== */

#[tokio::test]
async fn test_calling_a_number_is_a_type_error() {
    let err = run_err("(123)()").await;
    let failure = err.guest().expect("guest failure");
    assert!(failure.is_type_error());
    assert_eq!(failure.message(), "number is not a function");
}

#[tokio::test]
async fn test_calling_missing_method_is_a_type_error() {
    let err = run_err("var o = {}; o.missing(1)").await;
    let failure = err.guest().unwrap();
    assert!(failure.is_type_error());
    assert_eq!(failure.message(), "undefined is not a function");
}

#[tokio::test]
async fn test_new_on_non_constructor_is_a_type_error() {
    let err = run_err("new Math.floor(1)").await;
    assert!(err.guest().unwrap().is_type_error());

    let err = run_err("var n = 5; new n()").await;
    let failure = err.guest().unwrap();
    assert!(failure.is_type_error());
    assert_eq!(failure.message(), "5 is not a constructor");
}

#[tokio::test]
async fn test_unbound_identifier_is_a_reference_error() {
    let err = run_err("missingName + 1").await;
    let failure = err.guest().unwrap();
    assert!(failure.is_reference_error());
    assert_eq!(failure.message(), "missingName is not defined");
}

#[tokio::test]
async fn test_unbound_identifier_inside_function() {
    let err = run_err("function f() { return nowhere; } f()").await;
    assert!(err.guest().unwrap().is_reference_error());
}

#[tokio::test]
async fn test_property_of_undefined_is_a_type_error() {
    let err = run_err("var u; u.field").await;
    let failure = err.guest().unwrap();
    assert!(failure.is_type_error());
    assert_eq!(failure.message(), "Cannot read properties of undefined (reading 'field')");
}

#[tokio::test]
async fn test_thrown_error_objects_keep_kind_and_message() {
    let err = run_err("throw new RangeError('too far')").await;
    let failure = err.guest().unwrap();
    assert!(failure.is_kind(errors::RANGE_ERROR));
    assert_eq!(failure.message(), "too far");
    assert_eq!(failure.value, json!({"name": "RangeError", "message": "too far"}));
}

#[tokio::test]
async fn test_thrown_plain_values_are_uncaught() {
    let err = run_err("throw {code: 7}").await;
    let failure = err.guest().unwrap();
    assert_eq!(failure.kind(), errors::UNCAUGHT);
    assert_eq!(failure.value, json!({"code": 7}));
    assert_eq!(err.to_string(), "uncaught Uncaught: [object Object]");
}

#[tokio::test]
async fn test_throw_unwinds_through_functions_and_loops() {
    let engine = engine();
    let source = r#"
        var reached = false;
        function deep(n) {
            while (true) {
                if (n == 0) throw new Error('bottom');
                return deep(n - 1);
            }
        }
        deep(3);
        reached = true;
    "#;
    let err = engine.run(source).await.unwrap_err();
    assert_eq!(err.guest().unwrap().message(), "bottom");
    assert_eq!(engine.global().get("reached"), Some(Value::from(false)));

    // The stack is clean again afterwards
    assert!(engine.run("deep(1)").await.is_err());
    assert_eq!(engine.run("1 + 1").await.unwrap(), Value::from(2));
}

#[tokio::test]
async fn test_call_depth_limit_is_a_range_error() {
    let engine = Engine::builder()
        .config(EngineConfig {
            max_call_depth: 20,
            ..EngineConfig::default()
        })
        .build();
    let err = engine.run("function f(n) { return f(n + 1); } f(0)").await.unwrap_err();
    let failure = err.guest().unwrap();
    assert!(failure.is_kind(errors::RANGE_ERROR));
    assert_eq!(failure.message(), "Maximum call stack size exceeded");
}

#[tokio::test]
async fn test_default_call_depth_is_reached_without_native_overflow() {
    let engine = Engine::builder().build();
    let limit = EngineConfig::default().max_call_depth;
    engine
        .run("function down(n) { if (n == 0) return 0; return 1 + down(n - 1); }")
        .await
        .unwrap();

    // The program frame plus one activation per level fills the limit exactly
    let value = engine.run(&format!("down({})", limit - 2)).await.unwrap();
    assert_eq!(value, Value::from((limit - 2) as f64));

    let err = engine.run(&format!("down({})", limit - 1)).await.unwrap_err();
    let failure = err.guest().unwrap();
    assert!(failure.is_kind(errors::RANGE_ERROR));
    assert_eq!(failure.message(), "Maximum call stack size exceeded");
}

#[tokio::test]
async fn test_deep_call_depth_grows_the_native_stack() {
    let engine = Engine::builder()
        .config(EngineConfig {
            max_call_depth: 2_500,
            ..EngineConfig::default()
        })
        .build();
    let source = r#"
        function walk(n) {
            var total = 0;
            for (var i = 0; i < 1; i++) {
                if (n > 0) total = 1 + walk(n - 1);
            }
            return total;
        }
        walk(2000)
    "#;
    assert_eq!(engine.run(source).await.unwrap(), Value::from(2000.0));

    let err = engine.run("walk(3000)").await.unwrap_err();
    assert!(err.guest().unwrap().is_kind(errors::RANGE_ERROR));
    assert_eq!(engine.run("walk(2)").await.unwrap(), Value::from(2.0));
}

#[tokio::test]
async fn test_in_operator_needs_an_object() {
    let err = run_err("'a' in 'abc'").await;
    assert!(err.guest().unwrap().is_type_error());
}

#[tokio::test]
async fn test_for_of_over_number_is_a_type_error() {
    let err = run_err("for (var v of 5) {}").await;
    assert!(err.guest().unwrap().is_type_error());
}

/* ===================== Engine Faults ===================== */

#[tokio::test]
async fn test_try_statement_is_unsupported() {
    let err = run_err("try { 1 } catch (e) { 2 }").await;
    assert!(matches!(err, EngineError::Unsupported(_)));
    assert!(err.guest().is_none());
}

#[tokio::test]
async fn test_try_after_side_effects_still_fails() {
    let engine = engine();
    let err = engine.run("var before = 1; try { before = 2 } finally { before = 3 }").await.unwrap_err();
    assert!(matches!(err, EngineError::Unsupported(_)));
    assert_eq!(engine.global().get("before"), Some(Value::from(1)));
}

/// Compile `source`, then let `tamper` edit the scope tree
fn tampered_unit(source: &str, tamper: impl FnOnce(&mut CompiledUnit)) -> Rc<CompiledUnit> {
    let mut unit = Rc::try_unwrap(compile_roundtrip(source)).unwrap();
    tamper(&mut unit);
    Rc::new(unit)
}

#[tokio::test]
async fn test_literal_missing_from_parent_record_is_a_link_desync() {
    let unit = tampered_unit("var f = function() { return 1; }; f()", |unit| {
        unit.records[0].children.clear();
    });
    let err = engine().run_unit(unit).await.unwrap_err();
    match err {
        EngineError::LinkDesync { node, ref detail, .. } => {
            assert_eq!(node, NodeId(1));
            assert!(detail.contains("recorded children"));
        }
        other => panic!("expected link desync, got {:?}", other),
    }
}

#[tokio::test]
async fn test_function_without_record_is_a_link_desync() {
    let engine = engine();
    let unit = tampered_unit("var reached = 0; var f = function() { reached = 1; }; f()", |unit| {
        unit.records.truncate(1);
    });
    let err = engine.run_unit(unit).await.unwrap_err();
    assert!(matches!(err, EngineError::LinkDesync { node: NodeId(1), .. }));
    assert!(err.guest().is_none());
    assert_eq!(engine.global().get("reached"), Some(Value::from(0)));

    // A faithful unit still runs on the same engine
    let unit = compile_roundtrip("var g = function() { return 2; }; g()");
    assert_eq!(engine.run_unit(unit).await.unwrap(), Value::from(2));
}

#[tokio::test]
async fn test_syntax_errors_are_compile_errors() {
    let err = run_err("var = 1").await;
    assert!(matches!(err, EngineError::Compile(_)));

    let err = run_err("let x = 1").await;
    assert!(matches!(err, EngineError::Compile(_)));
}

#[tokio::test]
async fn test_misplaced_control_statements_are_compile_errors() {
    assert!(matches!(run_err("return 1").await, EngineError::Compile(_)));
    assert!(matches!(run_err("break").await, EngineError::Compile(_)));
    assert!(matches!(run_err("while (true) { continue nowhere; }").await, EngineError::Compile(_)));
}

#[tokio::test]
async fn test_host_call_on_non_function() {
    let engine = engine();
    let err = engine.call(&Value::from("text"), Value::Undefined, vec![]).await.unwrap_err();
    assert!(matches!(err, EngineError::NotCallable(ref t) if t == "string"));
}

#[tokio::test]
async fn test_native_errors_pass_instanceof() {
    let engine = engine();
    let value = engine
        .run("var e = new TypeError('x'); [e instanceof TypeError, e instanceof RangeError, e.name, e.message]")
        .await
        .unwrap();
    assert_eq!(value.to_json(), json!([true, false, "TypeError", "x"]));
}
