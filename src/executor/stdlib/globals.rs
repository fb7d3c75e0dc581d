//! Global functions and namespace objects: Object, Array, JSON, console,
//! conversions and the error constructors

use std::rc::Rc;

use super::{arg, expect_args};
use crate::executor::errors;
use crate::executor::evaluator::Runtime;
use crate::executor::types::{EvalResult, ObjectRef, Value};

/* ===================== Namespaces ===================== */

/// eval(code) - the runtime intercepts calls and evaluates `code` in the
/// caller's scope. A call that reaches this body returns its argument.
pub fn eval(_rt: &Runtime, _this: &Value, args: &[Value]) -> EvalResult {
    Ok(arg(args, 0))
}

/// Object.keys(obj)
pub fn object_keys(rt: &Runtime, _this: &Value, args: &[Value]) -> EvalResult {
    let target = arg(args, 0);
    let keys: Vec<Value> = match &target {
        Value::String(s) => (0..s.chars().count())
            .map(|i| Value::String(Rc::from(i.to_string())))
            .collect(),
        other => match other.property_holder() {
            Some(obj) => obj.own_keys().into_iter().map(Value::String).collect(),
            None if other.is_nullish() => {
                return Err(rt.type_error("Cannot convert undefined or null to object"))
            }
            None => Vec::new(),
        },
    };
    Ok(Value::Object(ObjectRef::array(keys)))
}

/// Array.isArray(value)
pub fn array_is_array(_rt: &Runtime, _this: &Value, args: &[Value]) -> EvalResult {
    Ok(Value::Bool(matches!(arg(args, 0), Value::Object(obj) if obj.is_array())))
}

/// JSON.stringify(value) - `undefined` for values JSON cannot represent
pub fn json_stringify(rt: &Runtime, _this: &Value, args: &[Value]) -> EvalResult {
    let value = arg(args, 0);
    if matches!(
        value,
        Value::Undefined | Value::Function(_) | Value::Native(_)
    ) {
        return Ok(Value::Undefined);
    }
    serde_json::to_string(&value.to_json())
        .map(Value::from)
        .map_err(|e| rt.type_error(e.to_string()))
}

/// JSON.parse(text)
pub fn json_parse(rt: &Runtime, _this: &Value, args: &[Value]) -> EvalResult {
    expect_args(rt, "JSON.parse", args, 1)?;
    let text = arg(args, 0).to_js_string();
    serde_json::from_str::<serde_json::Value>(&text)
        .map(|json| Value::from_json(&json))
        .map_err(|e| rt.throw_error(errors::SYNTAX_ERROR, e.to_string()))
}

/// console.log(...values) - goes to the `cadence::guest` tracing target
pub fn console_log(rt: &Runtime, _this: &Value, args: &[Value]) -> EvalResult {
    let line = args
        .iter()
        .map(|v| v.to_js_string())
        .collect::<Vec<_>>()
        .join(" ");
    tracing::info!(target: "cadence::guest", engine = %rt.name(), "{}", line);
    Ok(Value::Undefined)
}

/* ===================== Conversions ===================== */

/// String(value)
pub fn to_string(_rt: &Runtime, _this: &Value, args: &[Value]) -> EvalResult {
    Ok(match args.first() {
        Some(v) => Value::from(v.to_js_string()),
        None => Value::str(""),
    })
}

/// Number(value) - `0` with no argument
pub fn to_number(_rt: &Runtime, _this: &Value, args: &[Value]) -> EvalResult {
    Ok(Value::Number(args.first().map(|v| v.to_number()).unwrap_or(0.0)))
}

/// Boolean(value)
pub fn to_boolean(_rt: &Runtime, _this: &Value, args: &[Value]) -> EvalResult {
    Ok(Value::Bool(arg(args, 0).to_boolean()))
}

/// isNaN(value)
pub fn is_nan(_rt: &Runtime, _this: &Value, args: &[Value]) -> EvalResult {
    Ok(Value::Bool(arg(args, 0).to_number().is_nan()))
}

/// parseInt(text, radix)
pub fn parse_int(_rt: &Runtime, _this: &Value, args: &[Value]) -> EvalResult {
    let text = arg(args, 0).to_js_string();
    let radix = match arg(args, 1) {
        Value::Undefined => 0,
        v => v.to_number() as i64,
    };
    Ok(Value::Number(parse_int_str(&text, radix)))
}

pub(crate) fn parse_int_str(text: &str, radix: i64) -> f64 {
    let mut s = text.trim_start();
    let mut negative = false;
    if let Some(rest) = s.strip_prefix('-') {
        negative = true;
        s = rest;
    } else if let Some(rest) = s.strip_prefix('+') {
        s = rest;
    }

    let mut radix = radix;
    if radix == 0 || radix == 16 {
        if let Some(rest) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            s = rest;
            radix = 16;
        }
    }
    if radix == 0 {
        radix = 10;
    }
    if !(2..=36).contains(&radix) {
        return f64::NAN;
    }

    let mut out = 0f64;
    let mut any = false;
    for c in s.chars() {
        match c.to_digit(radix as u32) {
            Some(d) => {
                out = out * radix as f64 + d as f64;
                any = true;
            }
            None => break,
        }
    }
    if !any {
        return f64::NAN;
    }
    if negative {
        -out
    } else {
        out
    }
}

/// parseFloat(text) - longest numeric prefix
pub fn parse_float(_rt: &Runtime, _this: &Value, args: &[Value]) -> EvalResult {
    Ok(Value::Number(parse_float_str(&arg(args, 0).to_js_string())))
}

pub(crate) fn parse_float_str(text: &str) -> f64 {
    let s = text.trim_start();
    let unsigned = s.trim_start_matches(['+', '-']);
    if unsigned.starts_with("Infinity") {
        return if s.starts_with('-') {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        };
    }

    let bytes = s.as_bytes();
    let mut end = 0;
    if end < bytes.len() && (bytes[end] == b'+' || bytes[end] == b'-') {
        end += 1;
    }
    let digits_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end < bytes.len() && bytes[end] == b'.' {
        end += 1;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
    }
    if end == digits_start || &s[digits_start..end] == "." {
        return f64::NAN;
    }
    if end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
        let mut exp_end = end + 1;
        if exp_end < bytes.len() && (bytes[exp_end] == b'+' || bytes[exp_end] == b'-') {
            exp_end += 1;
        }
        let exp_digits = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits {
            end = exp_end;
        }
    }
    s[..end].parse::<f64>().unwrap_or(f64::NAN)
}

/* ===================== Error Constructors ===================== */

fn make_error(kind: &str, args: &[Value]) -> EvalResult {
    let message = match arg(args, 0) {
        Value::Undefined => String::new(),
        v => v.to_js_string(),
    };
    Ok(Value::Object(ObjectRef::error(kind, &message)))
}

/// Error(message)
pub fn error(_rt: &Runtime, _this: &Value, args: &[Value]) -> EvalResult {
    make_error(errors::ERROR, args)
}

/// TypeError(message)
pub fn type_error(_rt: &Runtime, _this: &Value, args: &[Value]) -> EvalResult {
    make_error(errors::TYPE_ERROR, args)
}

/// ReferenceError(message)
pub fn reference_error(_rt: &Runtime, _this: &Value, args: &[Value]) -> EvalResult {
    make_error(errors::REFERENCE_ERROR, args)
}

/// RangeError(message)
pub fn range_error(_rt: &Runtime, _this: &Value, args: &[Value]) -> EvalResult {
    make_error(errors::RANGE_ERROR, args)
}

/// SyntaxError(message)
pub fn syntax_error(_rt: &Runtime, _this: &Value, args: &[Value]) -> EvalResult {
    make_error(errors::SYNTAX_ERROR, args)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_int_prefixes() {
        assert_eq!(parse_int_str("  42px", 0), 42.0);
        assert_eq!(parse_int_str("-0x1F", 0), -31.0);
        assert_eq!(parse_int_str("101", 2), 5.0);
        assert!(parse_int_str("px", 0).is_nan());
        assert!(parse_int_str("1", 40).is_nan());
    }

    #[test]
    fn test_parse_float_prefixes() {
        assert_eq!(parse_float_str("3.25abc"), 3.25);
        assert_eq!(parse_float_str("-1e3x"), -1000.0);
        assert_eq!(parse_float_str("2e"), 2.0);
        assert_eq!(parse_float_str(".5"), 0.5);
        assert_eq!(parse_float_str("-Infinity"), f64::NEG_INFINITY);
        assert!(parse_float_str(".").is_nan());
        assert!(parse_float_str("abc").is_nan());
    }
}
