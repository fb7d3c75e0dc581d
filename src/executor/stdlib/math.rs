//! Math stdlib functions

use super::{arg, method};
use crate::executor::evaluator::Runtime;
use crate::executor::types::{EvalResult, ObjectRef, Value};

pub(super) fn object() -> ObjectRef {
    let math = ObjectRef::plain(None);
    math.define_hidden("PI", Value::Number(std::f64::consts::PI));
    math.define_hidden("E", Value::Number(std::f64::consts::E));
    method(&math, "floor", floor);
    method(&math, "ceil", ceil);
    method(&math, "abs", abs);
    method(&math, "round", round);
    method(&math, "trunc", trunc);
    method(&math, "sign", sign);
    method(&math, "sqrt", sqrt);
    method(&math, "pow", pow);
    method(&math, "max", max);
    method(&math, "min", min);
    math
}

fn unary(args: &[Value], f: impl Fn(f64) -> f64) -> EvalResult {
    Ok(Value::Number(f(arg(args, 0).to_number())))
}

/// Math.floor(x)
pub fn floor(_rt: &Runtime, _this: &Value, args: &[Value]) -> EvalResult {
    unary(args, f64::floor)
}

/// Math.ceil(x)
pub fn ceil(_rt: &Runtime, _this: &Value, args: &[Value]) -> EvalResult {
    unary(args, f64::ceil)
}

/// Math.abs(x)
pub fn abs(_rt: &Runtime, _this: &Value, args: &[Value]) -> EvalResult {
    unary(args, f64::abs)
}

/// Math.round(x) - halves round towards +Infinity
pub fn round(_rt: &Runtime, _this: &Value, args: &[Value]) -> EvalResult {
    unary(args, |n| (n + 0.5).floor())
}

/// Math.trunc(x)
pub fn trunc(_rt: &Runtime, _this: &Value, args: &[Value]) -> EvalResult {
    unary(args, f64::trunc)
}

/// Math.sign(x)
pub fn sign(_rt: &Runtime, _this: &Value, args: &[Value]) -> EvalResult {
    unary(args, |n| {
        if n.is_nan() || n == 0.0 {
            n
        } else {
            n.signum()
        }
    })
}

/// Math.sqrt(x)
pub fn sqrt(_rt: &Runtime, _this: &Value, args: &[Value]) -> EvalResult {
    unary(args, f64::sqrt)
}

/// Math.pow(base, exponent)
pub fn pow(_rt: &Runtime, _this: &Value, args: &[Value]) -> EvalResult {
    let base = arg(args, 0).to_number();
    let exponent = arg(args, 1).to_number();
    if exponent.is_nan() || (base.abs() == 1.0 && exponent.is_infinite()) {
        return Ok(Value::Number(f64::NAN));
    }
    Ok(Value::Number(base.powf(exponent)))
}

/// Math.max(...values) - `-Infinity` with no arguments
pub fn max(_rt: &Runtime, _this: &Value, args: &[Value]) -> EvalResult {
    let mut out = f64::NEG_INFINITY;
    for v in args {
        let n = v.to_number();
        if n.is_nan() {
            return Ok(Value::Number(f64::NAN));
        }
        out = out.max(n);
    }
    Ok(Value::Number(out))
}

/// Math.min(...values) - `Infinity` with no arguments
pub fn min(_rt: &Runtime, _this: &Value, args: &[Value]) -> EvalResult {
    let mut out = f64::INFINITY;
    for v in args {
        let n = v.to_number();
        if n.is_nan() {
            return Ok(Value::Number(f64::NAN));
        }
        out = out.min(n);
    }
    Ok(Value::Number(out))
}
