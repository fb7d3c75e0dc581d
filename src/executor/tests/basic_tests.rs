//! Tests for sequencing, operators, objects and functions

use super::helpers::{engine, global, run, run_on};
use crate::engine::Engine;
use crate::executor::Value;
use serde_json::json;

/* ===================== Sequencing ===================== */

#[tokio::test]
async fn test_program_value_is_last_statement() {
    assert_eq!(run("1;2;3").await, Value::from(3));
}

#[tokio::test]
async fn test_empty_program_is_undefined() {
    assert_eq!(run("").await, Value::Undefined);
    assert_eq!(run("// nothing here").await, Value::Undefined);
}

#[tokio::test]
async fn test_globals_persist_across_runs() {
    let engine = engine();
    run_on(&engine, "var a = 1;").await;
    run_on(&engine, "a = a + 41;").await;
    assert_eq!(run_on(&engine, "a").await, Value::from(42));
    assert_eq!(global(&engine, "a"), Value::from(42));
}

#[tokio::test]
async fn test_root_var_without_init_is_undefined() {
    let engine = engine();
    assert_eq!(run_on(&engine, "var u; typeof u").await, Value::from("undefined"));
    assert!(engine.global().has_own("u"));
}

#[tokio::test]
async fn test_array_literal_evaluates_left_to_right() {
    let value = run("var log = ''; [log += 'a', log += 'b', log += 'c']; log").await;
    assert_eq!(value, Value::from("abc"));
}

/* ===================== Operators ===================== */

#[tokio::test]
async fn test_arithmetic_and_coercion() {
    let value = run("[1 + 2 * 3, (1 + 2) * 3, 7 % 3, 2 ** 10, 'a' + 1, '3' * '4', -'2']").await;
    assert_eq!(value.to_json(), json!([7, 9, 1, 1024, "a1", 12, -2]));
}

#[tokio::test]
async fn test_exponent_is_right_associative() {
    assert_eq!(run("2 ** 3 ** 2").await, Value::from(512));
}

#[tokio::test]
async fn test_bitwise_and_shift_operators() {
    let value = run("[5 & 3, 5 | 3, 5 ^ 3, ~5, -7 >> 1, -1 >>> 28, 1 << 4]").await;
    assert_eq!(value.to_json(), json!([1, 7, 6, -6, -4, 15, 16]));
}

#[tokio::test]
async fn test_equality_and_comparison() {
    let value = run("[1 == '1', 1 === '1', null == undefined, null === undefined, 'b' > 'a', 2 >= 3, NaN == NaN]").await;
    assert_eq!(value.to_json(), json!([true, false, true, false, true, false, false]));
}

#[tokio::test]
async fn test_logical_operators_short_circuit() {
    let engine = engine();
    let value = run_on(
        &engine,
        "var hits = 0; function hit() { hits++; return true; } [0 && hit(), 1 || hit(), null ?? 'd', 1 && 'yes', hits]",
    )
    .await;
    assert_eq!(value.to_json(), json!([0, 1, "d", "yes", 0]));
}

#[tokio::test]
async fn test_conditional_and_sequence() {
    assert_eq!(run("var x = 3; x > 2 ? 'big' : 'small'").await, Value::from("big"));
    assert_eq!(run("(1, 2, 3)").await, Value::from(3));
}

#[tokio::test]
async fn test_update_expressions() {
    let value = run("var i = 5; var a = i++; var b = ++i; var c = i--; [a, b, c, i]").await;
    assert_eq!(value.to_json(), json!([5, 7, 7, 6]));
}

#[tokio::test]
async fn test_compound_and_logical_assignment() {
    let value = run("var a = 10; a += 5; a -= 3; a *= 2; var b = null; b ??= 'set'; var c = 1; c &&= 9; [a, b, c]").await;
    assert_eq!(value.to_json(), json!([24, "set", 9]));
}

#[tokio::test]
async fn test_typeof_values() {
    let value = run("[typeof 1, typeof 'x', typeof true, typeof null, typeof undefined, typeof {}, typeof function() {}, typeof notDeclared]").await;
    assert_eq!(
        value.to_json(),
        json!(["number", "string", "boolean", "object", "undefined", "object", "function", "undefined"])
    );
}

#[tokio::test]
async fn test_void_and_delete() {
    let value = run("var o = {a: 1, b: 2}; var d = delete o.a; [void 0, d, 'a' in o, 'b' in o]").await;
    assert_eq!(value.to_json(), json!([null, true, false, true]));
}

/* ===================== Objects & Arrays ===================== */

#[tokio::test]
async fn test_object_literal_and_member_access() {
    let value = run("var o = {a: 1, 'b c': 2}; o.d = o.a + o['b c']; o['e'] = 4; o").await;
    assert_eq!(value.to_json(), json!({"a": 1, "b c": 2, "d": 3, "e": 4}));
}

#[tokio::test]
async fn test_array_length_and_index_writes() {
    let value = run("var a = [1, 2]; a[4] = 5; [a.length, a[3] === undefined, a[4]]").await;
    assert_eq!(value.to_json(), json!([5, true, 5]));
}

#[tokio::test]
async fn test_far_index_write_keeps_array_sparse() {
    let value = run(r#"
        var a = [];
        a[4294967294] = 1;
        a[2] = 'x';
        [a.length, a[4294967294], a[1], a[2], Object.keys(a).join()]
    "#)
    .await;
    assert_eq!(value.to_json(), json!([4294967295u64, 1, null, "x", "0,1,2,4294967294"]));
}

#[tokio::test]
async fn test_length_writes_do_not_allocate_holes() {
    let value = run(r#"
        var a = [1, 2, 3];
        a.length = 4000000000;
        var grown = a.length;
        a.push('end');
        var last = a[a.length - 1];
        a.length = 2;
        [grown, last, a.length, a.join('-'), a[3999999999]]
    "#)
    .await;
    assert_eq!(value.to_json(), json!([4000000000u64, "end", 2, "1-2", null]));
}

#[tokio::test]
async fn test_index_past_array_limit_is_a_plain_property() {
    let value = run("var a = []; a[4294967295] = 1; [a.length, a[4294967295]]").await;
    assert_eq!(value.to_json(), json!([0, 1]));
}

#[tokio::test]
async fn test_string_length_and_index() {
    let value = run("var s = 'hello'; [s.length, s[1], s[10]]").await;
    assert_eq!(value.to_json(), json!([5, "e", null]));
}

#[tokio::test]
async fn test_strings_count_characters_consistently() {
    let value = run("var s = 'aé😀b'; var n = 0; for (var c of s) n++; [s.length, s[2], s[s.length - 1], n]").await;
    assert_eq!(value.to_json(), json!([4, "😀", "b", 4]));
}

/* ===================== Functions ===================== */

#[tokio::test]
async fn test_member_call_binds_receiver() {
    let value = run("f = {a: function(x) { return this.b + x }, b: 5}; f.a(5)").await;
    assert_eq!(value, Value::from(10));
}

#[tokio::test]
async fn test_global_function_call_binds_global_receiver() {
    let value = run("var x = 1; function g() { return this.x; } var o = {x: 2, g: g}; [g(), o.g()]").await;
    assert_eq!(value.to_json(), json!([1, 2]));
}

#[tokio::test]
async fn test_function_declarations_are_hoisted() {
    assert_eq!(run("var r = twice(4); function twice(n) { return n * 2; } r").await, Value::from(8));
}

#[tokio::test]
async fn test_nested_declarations_are_hoisted() {
    let source = r#"
        function outer() {
            return inner() + 1;
            function inner() { return 41; }
        }
        outer()
    "#;
    assert_eq!(run(source).await, Value::from(42));
}

#[tokio::test]
async fn test_recursion() {
    let source = "function fib(n) { return n < 2 ? n : fib(n - 1) + fib(n - 2); } fib(12)";
    assert_eq!(run(source).await, Value::from(144));
}

#[tokio::test]
async fn test_missing_arguments_are_undefined() {
    let value = run("function f(a, b) { return [a, b === undefined, arguments.length]; } f(1)").await;
    assert_eq!(value.to_json(), json!([1, true, 1]));
}

#[tokio::test]
async fn test_named_function_expression_sees_itself() {
    let source = "var fact = function f(n) { return n <= 1 ? 1 : n * f(n - 1); }; fact(5)";
    assert_eq!(run(source).await, Value::from(120));
}

#[tokio::test]
async fn test_function_without_return_yields_undefined() {
    assert_eq!(run("function f() { 1 + 1; } f()").await, Value::Undefined);
}

#[tokio::test]
async fn test_new_and_instanceof() {
    let source = r#"
        function Point(x) { this.x = x; }
        Point.prototype.get = function() { return this.x; };
        var p = new Point(7);
        [p.get(), p instanceof Point, {} instanceof Point]
    "#;
    assert_eq!(run(source).await.to_json(), json!([7, true, false]));
}

#[tokio::test]
async fn test_constructor_returning_object_wins() {
    let source = "function Box() { this.a = 1; return {b: 2}; } var o = new Box(); [o.a, o.b]";
    assert_eq!(run(source).await.to_json(), json!([null, 2]));
}

#[tokio::test]
async fn test_this_at_root_is_global() {
    let engine = engine();
    assert_eq!(run_on(&engine, "var g = 3; this.g").await, Value::from(3));
}

#[tokio::test]
async fn test_defined_globals_are_visible() {
    let engine = Engine::builder()
        .define("seed", 40)
        .define("label", "answer")
        .build();
    assert_eq!(run_on(&engine, "label + ': ' + (seed + 2)").await, Value::from("answer: 42"));
}

#[tokio::test]
async fn test_host_global_is_read_through_not_written() {
    let host = crate::executor::ObjectRef::plain(None);
    host.set("shared", Value::from(1));
    let engine = Engine::builder().host_global(host.clone()).build();

    assert_eq!(run_on(&engine, "shared = shared + 1; shared").await, Value::from(2));
    assert_eq!(host.get("shared"), Some(Value::from(1)));
}

/* ===================== Eval ===================== */

#[tokio::test]
async fn test_eval_runs_in_the_calling_scope() {
    let source = r#"
        function sum(a) { var b = 2; return eval('a + b'); }
        function bump() { var n = 1; eval('n = n + 5'); return n; }
        [sum(40), bump()]
    "#;
    assert_eq!(run(source).await.to_json(), json!([42, 6]));
}

#[tokio::test]
async fn test_eval_at_top_level_and_on_non_strings() {
    let source = "var g = 3; [eval('g * 2'), eval(7), typeof eval]";
    assert_eq!(run(source).await.to_json(), json!([6, 7, "function"]));
}

#[tokio::test]
async fn test_eval_sees_the_receiver_of_the_calling_method() {
    let source = "var o = {v: 9, m: function() { return eval('this.v'); }}; o.m()";
    assert_eq!(run(source).await, Value::from(9));
}

#[tokio::test]
async fn test_functions_created_by_eval_close_over_the_caller() {
    let source = r#"
        function f() {
            var k = 1;
            var g = eval('(function() { return k; })');
            k = 5;
            return g();
        }
        function r(n) { return n == 0 ? 0 : eval('r(n - 1)') + 1; }
        [f(), r(5)]
    "#;
    assert_eq!(run(source).await.to_json(), json!([5, 5]));
}

#[tokio::test]
async fn test_eval_syntax_errors_are_guest_errors() {
    let err = super::helpers::run_err("function f() { return eval('var = '); } f()").await;
    assert!(err.guest().unwrap().is_kind(crate::executor::errors::SYNTAX_ERROR));
}

#[tokio::test]
async fn test_replaced_eval_is_called_like_any_function() {
    let source = r#"
        var calls = 0;
        global.eval = function(code) { calls++; return 'seen ' + code; };
        [eval('1 + 1'), calls]
    "#;
    assert_eq!(run(source).await.to_json(), json!(["seen 1 + 1", 1]));
}
