//! Tests for closures, scope introspection and the link protocol

use std::rc::Rc;

use super::helpers::{compile_roundtrip, engine, global, run_on};
use crate::engine::Engine;
use crate::error::EngineError;
use crate::executor::Value;
use maplit::hashmap;
use serde_json::json;

/* ===================== Capture & Introspection ===================== */

#[tokio::test]
async fn test_closure_environment_round_trip() {
    let engine = engine();
    run_on(
        &engine,
        "function a(){ var x=1234; return function(){ return x; } }",
    )
    .await;
    let closure = run_on(&engine, "a()").await;

    let scope = engine.scope_of(&closure).expect("closure was linked");
    assert_eq!(scope.get_environment(), hashmap! {"x".to_string() => Value::from(1234)});

    let written = scope.set_environment(&hashmap! {"x".to_string() => Value::from(25)});
    assert_eq!(written, 1);
    let value = engine.call(&closure, Value::Undefined, vec![]).await.unwrap();
    assert_eq!(value, Value::from(25));
}

#[tokio::test]
async fn test_set_environment_ignores_unknown_names() {
    let engine = engine();
    let closure = run_on(&engine, "(function(){ var k = 1; return function(){ return k; }; })()").await;
    let scope = engine.scope_of(&closure).unwrap();

    let written = scope.set_environment(&hashmap! {
        "k".to_string() => Value::from(2),
        "extra".to_string() => Value::from(3),
    });
    assert_eq!(written, 1);
    assert_eq!(scope.binding_names(), vec!["k".to_string()]);
}

#[tokio::test]
async fn test_each_activation_gets_its_own_scope() {
    let engine = engine();
    let source = r#"
        function counter(start) {
            var n = start;
            return function() { n = n + 1; return n; };
        }
        var a = counter(0);
        var b = counter(100);
        a(); a();
        [a(), b()]
    "#;
    assert_eq!(run_on(&engine, source).await.to_json(), json!([3, 101]));

    let a = global(&engine, "a");
    let b = global(&engine, "b");
    let env_a = engine.scope_of(&a).unwrap().get_environment();
    let env_b = engine.scope_of(&b).unwrap().get_environment();
    assert_eq!(env_a.get("n"), Some(&Value::from(3)));
    assert_eq!(env_b.get("n"), Some(&Value::from(101)));
}

#[tokio::test]
async fn test_unreferenced_locals_are_not_exposed() {
    let engine = engine();
    let closure = run_on(
        &engine,
        "function mk(p, unused) { var kept = p * 2; var dropped; return function() { return kept; }; } mk(4)",
    )
    .await;
    let env = engine.scope_of(&closure).unwrap().get_environment();
    assert_eq!(env, hashmap! {"p".to_string() => Value::from(4), "kept".to_string() => Value::from(8)});
}

#[tokio::test]
async fn test_root_functions_link_to_root_scope() {
    let engine = engine();
    run_on(&engine, "function top() { return 1; }").await;
    let top = global(&engine, "top");
    let scope = engine.scope_of(&top).unwrap();
    assert!(scope.is_root());
}

#[tokio::test]
async fn test_scope_of_non_function_is_none() {
    let engine = engine();
    assert!(engine.scope_of(&Value::from(1)).is_none());
    let native = run_on(&engine, "Math.floor").await;
    assert!(engine.scope_of(&native).is_none());
}

#[tokio::test]
async fn test_nested_closures_chain_scopes() {
    let engine = engine();
    let source = r#"
        function outer() {
            var a = 1;
            return function middle() {
                var b = 2;
                return function inner() { return a + b; };
            };
        }
        outer()()
    "#;
    let inner = run_on(&engine, source).await;
    let scope = engine.scope_of(&inner).unwrap();
    assert_eq!(scope.owner(), "middle");
    assert_eq!(scope.get("a"), Ok(Value::from(1)));
    assert_eq!(scope.parent().map(|p| p.owner().to_string()), Some("outer".to_string()));

    scope.parent().unwrap().set_environment(&hashmap! {"a".to_string() => Value::from(40)});
    let value = engine.call(&inner, Value::Undefined, vec![]).await.unwrap();
    assert_eq!(value, Value::from(42));
}

#[tokio::test]
async fn test_function_record_and_source() {
    let engine = engine();
    let add = run_on(&engine, "var add = function add(a, b) { return a + b }; add").await;

    let source = engine.function_source(&add).unwrap();
    assert!(source.starts_with("function add(a, b)"));
    assert!(source.ends_with('}'));

    let record = engine.function_record(&add).unwrap();
    assert_eq!(record.name, "add");
    assert_eq!(record.params, vec!["a".to_string(), "b".to_string()]);
    assert!(engine.function_record(&Value::Null).is_none());
}

#[tokio::test]
async fn test_anonymous_functions_get_synthetic_record_names() {
    let engine = engine();
    let f = run_on(&engine, "(function() { return 1; })").await;
    let record = engine.function_record(&f).unwrap();
    assert!(record.name.starts_with("anonymous"));
    assert_eq!(engine.function_source(&f).unwrap(), "function() { return 1; }");
}

/* ===================== Link Protocol ===================== */

#[tokio::test]
async fn test_literal_in_loop_reuses_its_record() {
    let engine = engine();
    let source = r#"
        function make() {
            var fns = [];
            for (var i = 0; i < 3; i++) fns.push(function() { return i; });
            return fns;
        }
        make()
    "#;
    let fns = run_on(&engine, source).await;
    let Value::Object(list) = fns else {
        panic!("expected an array");
    };
    let records: Vec<_> = list
        .elements()
        .iter()
        .map(|f| engine.function_record(f).unwrap().node)
        .collect();
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|node| *node == records[0]));
}

#[tokio::test]
async fn test_skipped_literals_do_not_desync_links() {
    let engine = engine();
    let source = r#"
        function pick(flag) {
            var f = flag ? function() { return 'a'; } : function() { return 'b'; };
            var g = function() { return 'c'; };
            return f() + g();
        }
        pick(false) + pick(true)
    "#;
    assert_eq!(run_on(&engine, source).await, Value::from("bcac"));
}

#[tokio::test]
async fn test_dropped_closures_are_pruned() {
    let engine = engine();
    run_on(&engine, "function mk() { return function() {}; } for (var i = 0; i < 5; i++) mk(); 0").await;
    // `mk` itself stays linked; the five discarded closures are gone
    assert_eq!(engine.link_count(), 1);
}

#[tokio::test]
async fn test_closures_held_by_their_own_scope_are_pruned() {
    let engine = engine();
    let source = r#"
        function mk() {
            function inner() { return 1; }
            return inner() - 1;
        }
        for (var i = 0; i < 5; i++) mk();
        0
    "#;
    run_on(&engine, source).await;
    assert_eq!(engine.link_count(), 1);
}

#[tokio::test]
async fn test_closures_held_through_objects_in_their_scope_are_pruned() {
    let engine = engine();
    let source = r#"
        function mk() {
            var o = {};
            o.f = function() { return o; };
            o.list = [o.f];
            return 0;
        }
        for (var i = 0; i < 5; i++) mk();
        0
    "#;
    run_on(&engine, source).await;
    assert_eq!(engine.link_count(), 1);
}

#[tokio::test]
async fn test_host_held_closures_survive_pruning() {
    let engine = engine();
    run_on(&engine, "function mk(n) { function get() { return n; } return get; }").await;
    let held = run_on(&engine, "[mk(1), mk(2)]").await;
    run_on(&engine, "mk(3); 0").await;
    assert_eq!(engine.link_count(), 3);

    let getters = held.as_object().unwrap().elements();
    assert_eq!(engine.call(&getters[0], Value::Undefined, vec![]).await.unwrap(), Value::from(1));
    assert_eq!(engine.call(&getters[1], Value::Undefined, vec![]).await.unwrap(), Value::from(2));
    assert!(engine.scope_of(&getters[1]).is_some());

    drop(getters);
    drop(held);
    run_on(&engine, "0").await;
    assert_eq!(engine.link_count(), 1);
}

#[tokio::test]
async fn test_pruning_keeps_closures_reachable_from_globals() {
    let engine = engine();
    let source = r#"
        function counter() {
            var n = 0;
            function step() { n = n + 1; return n; }
            return step;
        }
        var kept = {step: counter()};
        counter();
        kept.step();
    "#;
    run_on(&engine, source).await;
    assert_eq!(engine.link_count(), 2);
    assert_eq!(run_on(&engine, "kept.step()").await, Value::from(2));
}

#[tokio::test]
async fn test_precompiled_units_run_on_any_engine() {
    let unit = compile_roundtrip("function id(v) { return v; } id(9)");
    let first = engine();
    let second = Engine::new();
    assert_eq!(first.run_unit(unit.clone()).await.unwrap(), Value::from(9));
    assert_eq!(second.run_unit(unit).await.unwrap(), Value::from(9));
}

/* ===================== Scoped Eval ===================== */

#[tokio::test]
async fn test_scope_eval_reads_and_writes_live_bindings() {
    let engine = engine();
    run_on(&engine, "function a() { var x = 1234; return function() { return x; }; }").await;
    let closure = run_on(&engine, "a()").await;
    let scope = engine.scope_of(&closure).unwrap();

    assert_eq!(scope.eval(&engine, "x").await.unwrap(), Value::from(1234));
    assert_eq!(scope.eval(&engine, "x = x + 1; x * 2").await.unwrap(), Value::from(2470));
    let value = engine.call(&closure, Value::Undefined, vec![]).await.unwrap();
    assert_eq!(value, Value::from(1235));
}

#[tokio::test]
async fn test_scope_eval_sees_this_and_globals() {
    let engine = engine();
    let source = r#"
        var g = 'G';
        function mk() { var v = 1; return function() { return v; }; }
        var o = {mk: mk, tag: 'o'};
        o.mk()
    "#;
    let closure = run_on(&engine, source).await;
    let scope = engine.scope_of(&closure).unwrap();
    assert_eq!(scope.eval(&engine, "this.tag + v + g").await.unwrap(), Value::from("o1G"));
}

#[tokio::test]
async fn test_functions_declared_by_scope_eval_capture_the_scope() {
    let engine = engine();
    run_on(&engine, "function a() { var x = 1234; return function() { return x; }; }").await;
    let closure = run_on(&engine, "a()").await;
    let scope = engine.scope_of(&closure).unwrap();

    let value = scope
        .eval(&engine, "function bump() { x = x + 10; return x; } bump()")
        .await
        .unwrap();
    assert_eq!(value, Value::from(1244));

    // The declaration lands on the global object, its closure on the scope
    let bump = global(&engine, "bump");
    assert!(Rc::ptr_eq(&engine.scope_of(&bump).unwrap(), &scope));
    assert_eq!(run_on(&engine, "bump()").await, Value::from(1254));
    let value = engine.call(&closure, Value::Undefined, vec![]).await.unwrap();
    assert_eq!(value, Value::from(1254));
}

#[tokio::test]
async fn test_scope_eval_vars_outside_the_chain_are_global() {
    let engine = engine();
    let closure = run_on(&engine, "(function() { var k = 7; return function() { return k; }; })()").await;
    let scope = engine.scope_of(&closure).unwrap();

    scope.eval(&engine, "var fresh = k * 2; var k = 8").await.unwrap();
    assert_eq!(global(&engine, "fresh"), Value::from(14));
    assert_eq!(scope.get_environment(), hashmap! {"k".to_string() => Value::from(8)});
    assert!(engine.global().get("k").is_none());
}

#[tokio::test]
async fn test_scope_eval_on_root_scope_runs_against_globals() {
    let engine = engine();
    run_on(&engine, "var total = 5").await;
    let root = engine.root_scope().clone();
    assert_eq!(root.eval(&engine, "total + 1").await.unwrap(), Value::from(6));
}

#[tokio::test]
async fn test_scope_eval_failures() {
    let engine = engine();
    let closure = run_on(&engine, "(function() { var k = 1; return function() { return k; }; })()").await;
    let scope = engine.scope_of(&closure).unwrap();

    let err = scope.eval(&engine, "var = 1").await.unwrap_err();
    assert!(matches!(err, EngineError::Compile(_)));

    let err = scope.eval(&engine, "k.missing.deeper").await.unwrap_err();
    assert!(err.guest().unwrap().is_type_error());

    let other = Engine::new();
    let err = scope.eval(&other, "k").await.unwrap_err();
    assert!(matches!(err, EngineError::ForeignScope));
}

/* ===================== Isolation ===================== */

#[tokio::test]
async fn test_engines_are_isolated() {
    let left = engine();
    let right = engine();
    let (a, b) = tokio::join!(
        left.run("var x = 'left'; function who() { return x; } who()"),
        right.run("var x = 'right'; typeof who")
    );
    assert_eq!(a.unwrap(), Value::from("left"));
    assert_eq!(b.unwrap(), Value::from("undefined"));
    assert_eq!(global(&right, "x"), Value::from("right"));
    assert_eq!(global(&left, "x"), Value::from("left"));
    assert_eq!(right.link_count(), 0);
}
