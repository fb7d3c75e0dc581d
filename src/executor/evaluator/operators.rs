//! Operator semantics on already-resolved values

use std::cmp::Ordering;
use std::rc::Rc;

use super::Runtime;
use crate::executor::errors;
use crate::executor::types::{
    to_int32, to_uint32, BinaryOp, EvalResult, ObjectClass, UnaryOp, Value, ERROR_NAME_KEY,
};

pub(super) fn unary(op: UnaryOp, value: &Value) -> Value {
    match op {
        UnaryOp::Not => Value::Bool(!value.to_boolean()),
        UnaryOp::Neg => Value::Number(-value.to_number()),
        UnaryOp::Plus => Value::Number(value.to_number()),
        UnaryOp::BitNot => Value::Number(!to_int32(value.to_number()) as f64),
        // Evaluated by the caller; they need the operand expression
        UnaryOp::TypeOf => Value::str(value.type_of()),
        UnaryOp::Void | UnaryOp::Delete => Value::Undefined,
    }
}

pub(super) fn binary(rt: &Runtime, op: BinaryOp, left: &Value, right: &Value) -> EvalResult {
    Ok(match op {
        BinaryOp::Add => add(left, right),
        BinaryOp::Sub => Value::Number(left.to_number() - right.to_number()),
        BinaryOp::Mul => Value::Number(left.to_number() * right.to_number()),
        BinaryOp::Div => Value::Number(left.to_number() / right.to_number()),
        BinaryOp::Mod => Value::Number(left.to_number() % right.to_number()),
        BinaryOp::Pow => Value::Number(pow(left.to_number(), right.to_number())),

        BinaryOp::Eq => Value::Bool(left.loose_equals(right)),
        BinaryOp::Ne => Value::Bool(!left.loose_equals(right)),
        BinaryOp::StrictEq => Value::Bool(left.strict_equals(right)),
        BinaryOp::StrictNe => Value::Bool(!left.strict_equals(right)),

        BinaryOp::Lt => Value::Bool(compare(left, right) == Some(Ordering::Less)),
        BinaryOp::Gt => Value::Bool(compare(left, right) == Some(Ordering::Greater)),
        BinaryOp::Lte => Value::Bool(matches!(
            compare(left, right),
            Some(Ordering::Less | Ordering::Equal)
        )),
        BinaryOp::Gte => Value::Bool(matches!(
            compare(left, right),
            Some(Ordering::Greater | Ordering::Equal)
        )),

        BinaryOp::BitAnd => int32_op(left, right, |a, b| a & b),
        BinaryOp::BitOr => int32_op(left, right, |a, b| a | b),
        BinaryOp::BitXor => int32_op(left, right, |a, b| a ^ b),
        BinaryOp::Shl => int32_op(left, right, |a, b| a.wrapping_shl(b as u32 & 31)),
        BinaryOp::Shr => int32_op(left, right, |a, b| a >> (b as u32 & 31)),
        BinaryOp::UShr => {
            let shift = to_uint32(right.to_number()) & 31;
            Value::Number((to_uint32(left.to_number()) >> shift) as f64)
        }

        BinaryOp::In => return has_property(rt, left, right),
        BinaryOp::InstanceOf => return instance_of(rt, left, right),
    })
}

fn add(left: &Value, right: &Value) -> Value {
    let l = left.to_primitive();
    let r = right.to_primitive();
    if matches!(l, Value::String(_)) || matches!(r, Value::String(_)) {
        let mut s = l.to_js_string();
        s.push_str(&r.to_js_string());
        Value::String(Rc::from(s))
    } else {
        Value::Number(l.to_number() + r.to_number())
    }
}

fn pow(base: f64, exponent: f64) -> f64 {
    if exponent.is_nan() || (base.abs() == 1.0 && exponent.is_infinite()) {
        return f64::NAN;
    }
    base.powf(exponent)
}

/// Abstract relational comparison; `None` when either side is NaN
fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    let l = left.to_primitive();
    let r = right.to_primitive();
    match (&l, &r) {
        (Value::String(a), Value::String(b)) => Some(a.encode_utf16().cmp(b.encode_utf16())),
        _ => l.to_number().partial_cmp(&r.to_number()),
    }
}

fn int32_op(left: &Value, right: &Value, f: impl Fn(i32, i32) -> i32) -> Value {
    Value::Number(f(to_int32(left.to_number()), to_int32(right.to_number())) as f64)
}

fn has_property(rt: &Runtime, key: &Value, target: &Value) -> EvalResult {
    let key = key.to_property_key();
    match target.property_holder() {
        Some(obj) => Ok(Value::Bool(obj.has(&key))),
        None => Err(rt.type_error(format!(
            "Cannot use 'in' operator to search for '{}' in {}",
            key,
            target.to_js_string()
        ))),
    }
}

fn instance_of(rt: &Runtime, value: &Value, ctor: &Value) -> EvalResult {
    match ctor {
        Value::Function(closure) => {
            let Some(obj) = value.property_holder() else {
                return Ok(Value::Bool(false));
            };
            let proto = closure.prototype_object();
            let mut current = obj.proto();
            while let Some(p) = current {
                if p.ptr_eq(&proto) {
                    return Ok(Value::Bool(true));
                }
                current = p.proto();
            }
            Ok(Value::Bool(false))
        }
        Value::Native(native) => {
            let kind = &*native.name;
            if !errors::KINDS.contains(&kind) {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(match value {
                Value::Object(obj) if obj.class() == ObjectClass::Error => {
                    kind == errors::ERROR
                        || obj
                            .get(ERROR_NAME_KEY)
                            .map(|n| n.to_js_string() == kind)
                            .unwrap_or(false)
                }
                _ => false,
            }))
        }
        other => Err(rt.type_error(format!(
            "Right-hand side of 'instanceof' is not callable ({})",
            other.type_of()
        ))),
    }
}
