//! Compiler tests - parsing, global rewriting and scope-tree records
//!
//! These tests do NOT execute anything; evaluation is covered by the
//! executor tests.

use crate::compiler::{self, CompileError};
use crate::executor::types::ast::{
    AssignOp, BinaryOp, Expr, ForTarget, MemberProp, NodeId, Stmt,
};

fn first_stmt(source: &str) -> Stmt {
    let unit = compiler::compile(source).expect("Should compile");
    unit.program.body[0].clone()
}

fn global_name(expr: &Expr) -> Option<(&str, bool)> {
    match expr {
        Expr::Member {
            object,
            property: MemberProp::Named { name },
            implicit,
            ..
        } => match object.as_ref() {
            Expr::Ident { name: g, .. } if g == compiler::GLOBAL_NAME => {
                Some((name.as_str(), *implicit))
            }
            _ => None,
        },
        _ => None,
    }
}

/* ===================== Parsing ===================== */

#[test]
fn test_parse_number_literals() {
    let program = compiler::parse_program("0x1f; 1.5e3; .25").expect("Should parse");
    let values: Vec<f64> = program
        .body
        .iter()
        .map(|s| match s {
            Stmt::Expr {
                expr: Expr::LitNum { v, .. },
                ..
            } => *v,
            other => panic!("Expected number literal, got {:?}", other),
        })
        .collect();
    assert_eq!(values, vec![31.0, 1500.0, 0.25]);
}

#[test]
fn test_parse_string_escapes() {
    let program = compiler::parse_program(r#"'it\'s'; "a\tb\n""#).expect("Should parse");
    match (&program.body[0], &program.body[1]) {
        (
            Stmt::Expr {
                expr: Expr::LitStr { v: a, .. },
                ..
            },
            Stmt::Expr {
                expr: Expr::LitStr { v: b, .. },
                ..
            },
        ) => {
            assert_eq!(a, "it's");
            assert_eq!(b, "a\tb\n");
        }
        other => panic!("Expected two string literals, got {:?}", other),
    }
}

#[test]
fn test_parse_precedence() {
    let program = compiler::parse_program("1 + 2 * 3").expect("Should parse");
    match &program.body[0] {
        Stmt::Expr {
            expr:
                Expr::Binary {
                    op: BinaryOp::Add,
                    right,
                    ..
                },
            ..
        } => assert!(matches!(
            right.as_ref(),
            Expr::Binary {
                op: BinaryOp::Mul,
                ..
            }
        )),
        other => panic!("Expected addition at the top, got {:?}", other),
    }
}

#[test]
fn test_parse_exponent_is_right_associative() {
    let program = compiler::parse_program("2 ** 3 ** 2").expect("Should parse");
    match &program.body[0] {
        Stmt::Expr {
            expr:
                Expr::Binary {
                    op: BinaryOp::Pow,
                    left,
                    right,
                    ..
                },
            ..
        } => {
            assert!(matches!(left.as_ref(), Expr::LitNum { v, .. } if *v == 2.0));
            assert!(matches!(
                right.as_ref(),
                Expr::Binary {
                    op: BinaryOp::Pow,
                    ..
                }
            ));
        }
        other => panic!("Expected exponent, got {:?}", other),
    }
}

#[test]
fn test_parse_let_is_rejected() {
    let err = compiler::parse_program("let x = 1").unwrap_err();
    assert!(matches!(err, CompileError::Build(..)));
}

#[test]
fn test_parse_syntax_error_has_position() {
    let err = compiler::parse_program("var = ;").unwrap_err();
    assert!(matches!(err, CompileError::Syntax(..)));
    assert!(err.span().is_some());
}

#[test]
fn test_parse_function_ids_in_preorder() {
    let program = compiler::parse_program(
        "function a() { return function b() {}; } var c = function () {};",
    )
    .expect("Should parse");
    assert_eq!(program.function_count, 4);

    let Stmt::Function { func, .. } = &program.body[0] else {
        panic!("Expected function declaration");
    };
    assert_eq!(func.id, NodeId(1));
    assert_eq!(func.name.as_deref(), Some("a"));
    assert!(func.is_declaration);
}

/* ===================== Global Rewriting ===================== */

#[test]
fn test_root_var_becomes_global_assignment() {
    match first_stmt("var x = 1") {
        Stmt::Expr {
            expr:
                Expr::Assign {
                    op: AssignOp::Assign,
                    target,
                    ..
                },
            ..
        } => assert_eq!(global_name(&target), Some(("x", false))),
        other => panic!("Expected global assignment, got {:?}", other),
    }
}

#[test]
fn test_root_var_without_init_assigns_undefined() {
    match first_stmt("var x;") {
        Stmt::Expr {
            expr: Expr::Assign { value, .. },
            ..
        } => assert!(matches!(value.as_ref(), Expr::Ident { name, .. } if name == "undefined")),
        other => panic!("Expected global assignment, got {:?}", other),
    }
}

#[test]
fn test_unresolved_identifier_reads_global() {
    match first_stmt("foo") {
        Stmt::Expr { expr, .. } => assert_eq!(global_name(&expr), Some(("foo", true))),
        other => panic!("Expected expression statement, got {:?}", other),
    }
}

#[test]
fn test_reserved_names_stay_identifiers() {
    for name in ["undefined", "NaN", "global"] {
        match first_stmt(name) {
            Stmt::Expr {
                expr: Expr::Ident { name: n, .. },
                ..
            } => assert_eq!(n, name),
            other => panic!("Expected identifier for {}, got {:?}", name, other),
        }
    }
}

#[test]
fn test_root_for_in_var_target_is_global() {
    match first_stmt("for (var k in o) {}") {
        Stmt::ForIn {
            target: ForTarget::Expr { expr },
            ..
        } => assert_eq!(global_name(&expr), Some(("k", false))),
        other => panic!("Expected for-in over a global target, got {:?}", other),
    }
}

#[test]
fn test_local_names_are_not_rewritten() {
    let unit = compiler::compile("function f(a) { var b = a; return b + c; }")
        .expect("Should compile");
    let func = unit.function(NodeId(1)).expect("function #1");
    match &func.body[1] {
        Stmt::Return {
            arg:
                Some(Expr::Binary {
                    left, right, ..
                }),
            ..
        } => {
            assert!(matches!(left.as_ref(), Expr::Ident { name, .. } if name == "b"));
            assert_eq!(global_name(right), Some(("c", true)));
        }
        other => panic!("Expected return of a sum, got {:?}", other),
    }
}

/* ===================== Scope Tree ===================== */

#[test]
fn test_records_keep_only_referenced_bindings() {
    let unit = compiler::compile("function f(a, unused) { var x = 1; var y; return a; }")
        .expect("Should compile");
    let record = unit.record(NodeId(1)).expect("record");
    assert_eq!(record.name, "f");
    assert_eq!(record.params, vec!["a", "unused"]);
    assert_eq!(record.bindings, vec!["a", "x"]);
    assert!(record.requires_capture);
}

#[test]
fn test_function_without_bindings_needs_no_capture() {
    let unit = compiler::compile("function f() { return 1; }").expect("Should compile");
    let record = unit.record(NodeId(1)).expect("record");
    assert!(record.bindings.is_empty());
    assert!(!record.requires_capture);
}

#[test]
fn test_this_forces_capture() {
    let unit = compiler::compile("var o = { m: function () { return this; } }")
        .expect("Should compile");
    let record = unit.record(NodeId(1)).expect("record");
    assert!(record.uses_this);
    assert!(record.requires_capture);
    assert_eq!(record.name, "anonymous_1");
}

#[test]
fn test_children_list_declarations_first() {
    let unit = compiler::compile(
        "function outer() { var f = function () {}; function g() {} return f; }",
    )
    .expect("Should compile");
    let record = unit.record(NodeId(1)).expect("record");
    assert_eq!(record.hoisted, vec![NodeId(3)]);
    assert_eq!(record.children, vec![NodeId(3), NodeId(2)]);

    let root = unit.root().expect("root record");
    assert_eq!(root.name, compiler::ROOT_FUNCTION_NAME);
    assert_eq!(root.hoisted, vec![NodeId(1)]);
}

#[test]
fn test_arguments_binding_when_referenced() {
    let unit = compiler::compile("function f() { return arguments.length; }")
        .expect("Should compile");
    let record = unit.record(NodeId(1)).expect("record");
    assert_eq!(record.bindings, vec![compiler::ARGUMENTS_NAME]);
}

#[test]
fn test_named_expression_binds_itself() {
    let unit = compiler::compile("var fact = function f(n) { return n ? n * f(n - 1) : 1; }")
        .expect("Should compile");
    let record = unit.record(NodeId(1)).expect("record");
    assert_eq!(record.self_binding.as_deref(), Some("f"));
    assert!(record.bindings.contains(&"f".to_string()));
}

#[test]
fn test_closure_marks_outer_binding_referenced() {
    let unit = compiler::compile("function a() { var x = 1234; return function () { return x; }; }")
        .expect("Should compile");
    assert_eq!(unit.record(NodeId(1)).expect("a").bindings, vec!["x"]);
    assert!(unit.record(NodeId(2)).expect("inner").bindings.is_empty());
}

#[test]
fn test_eval_keeps_every_declared_binding() {
    let unit = compiler::compile("function f(a, unused) { var x; return eval('a'); }")
        .expect("Should compile");
    let record = unit.record(NodeId(1)).expect("record");
    assert_eq!(record.bindings, vec!["a", "unused", "x"]);
    assert!(record.uses_this);
    assert!(record.requires_capture);
}

#[test]
fn test_scoped_unit_resolves_outer_names() {
    let outer = vec!["x".to_string(), "y".to_string()];
    let unit = compiler::compile_in("x = y + 1; var z = 2; var x; w", &outer)
        .expect("Should compile");
    let exprs: Vec<&Expr> = unit
        .program
        .body
        .iter()
        .map(|stmt| match stmt {
            Stmt::Expr { expr, .. } => expr,
            other => panic!("Expected expression statement, got {:?}", other),
        })
        .collect();

    match exprs[0] {
        Expr::Assign { target, value, .. } => {
            assert!(matches!(target.as_ref(), Expr::Ident { name, .. } if name == "x"));
            match value.as_ref() {
                Expr::Binary { left, .. } => {
                    assert!(matches!(left.as_ref(), Expr::Ident { name, .. } if name == "y"))
                }
                other => panic!("Expected binary, got {:?}", other),
            }
        }
        other => panic!("Expected assignment, got {:?}", other),
    }
    match exprs[1] {
        Expr::Assign { target, .. } => assert_eq!(global_name(target), Some(("z", false))),
        other => panic!("Expected assignment, got {:?}", other),
    }
    match exprs[2] {
        Expr::Assign { target, .. } => {
            assert!(matches!(target.as_ref(), Expr::Ident { name, .. } if name == "x"))
        }
        other => panic!("Expected assignment, got {:?}", other),
    }
    assert_eq!(global_name(exprs[3]), Some(("w", true)));
}

#[test]
fn test_unit_hash_is_stable() {
    let a = compiler::compile("1 + 1").expect("Should compile");
    let b = compiler::compile("1 + 1").expect("Should compile");
    assert_eq!(a.hash, b.hash);
    assert_eq!(a.hash.len(), 64);
}

/* ===================== Validation ===================== */

#[test]
fn test_return_outside_function_is_invalid() {
    let err = compiler::compile("return 1").unwrap_err();
    assert!(matches!(err, CompileError::Invalid(..)));
}

#[test]
fn test_break_outside_loop_is_invalid() {
    let err = compiler::compile("break;").unwrap_err();
    assert!(matches!(err, CompileError::Invalid(..)));
}

#[test]
fn test_continue_to_non_loop_label_is_invalid() {
    let err = compiler::compile("a: { while (true) { continue a; } }").unwrap_err();
    assert!(err.message().contains("does not denote an iteration statement"));
}

#[test]
fn test_break_to_block_label_is_valid() {
    assert!(compiler::compile("a: { break a; }").is_ok());
}

#[test]
fn test_loop_depth_resets_inside_functions() {
    let err = compiler::compile("while (true) { (function () { break; }); }").unwrap_err();
    assert!(matches!(err, CompileError::Invalid(..)));
}
