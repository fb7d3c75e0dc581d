//! Array methods, looked up for every array value

use super::arg;
use crate::executor::evaluator::Runtime;
use crate::executor::types::{Control, EvalResult, ObjectRef, Value};

fn this_array<'a>(rt: &Runtime, this: &'a Value, method: &str) -> Result<&'a ObjectRef, Control> {
    match this {
        Value::Object(obj) if obj.is_array() => Ok(obj),
        other => Err(rt.type_error(format!(
            "Array.prototype.{} called on {}",
            method,
            other.type_of()
        ))),
    }
}

/// Resolve a relative index the way `slice` does
fn relative_index(value: &Value, len: usize, default: usize) -> usize {
    if value.is_undefined() {
        return default;
    }
    let n = value.to_number();
    if n.is_nan() {
        return 0;
    }
    let n = n.trunc();
    if n < 0.0 {
        (len as f64 + n).max(0.0) as usize
    } else {
        (n as usize).min(len)
    }
}

/// arr.push(...items) - returns the new length
pub fn push(rt: &Runtime, this: &Value, args: &[Value]) -> EvalResult {
    let arr = this_array(rt, this, "push")?;
    Ok(Value::Number(arr.push_elements(args) as f64))
}

/// arr.pop()
pub fn pop(rt: &Runtime, this: &Value, _args: &[Value]) -> EvalResult {
    let arr = this_array(rt, this, "pop")?;
    Ok(arr.pop_element())
}

/// arr.join(separator = ",")
pub fn join(rt: &Runtime, this: &Value, args: &[Value]) -> EvalResult {
    let arr = this_array(rt, this, "join")?;
    let separator = match arg(args, 0) {
        Value::Undefined => ",".to_string(),
        v => v.to_js_string(),
    };
    let parts: Vec<String> = arr
        .elements()
        .iter()
        .map(|v| match v {
            Value::Undefined | Value::Null => String::new(),
            other => other.to_js_string(),
        })
        .collect();
    Ok(Value::from(parts.join(&separator)))
}

/// arr.indexOf(value) - strict equality, `-1` when missing
pub fn index_of(rt: &Runtime, this: &Value, args: &[Value]) -> EvalResult {
    let arr = this_array(rt, this, "indexOf")?;
    let needle = arg(args, 0);
    let found = arr
        .elements()
        .iter()
        .position(|v| v.strict_equals(&needle))
        .map(|i| i as f64)
        .unwrap_or(-1.0);
    Ok(Value::Number(found))
}

/// arr.slice(start, end)
pub fn slice(rt: &Runtime, this: &Value, args: &[Value]) -> EvalResult {
    let arr = this_array(rt, this, "slice")?;
    let elements = arr.elements();
    let len = elements.len();
    let start = relative_index(&arg(args, 0), len, 0);
    let end = relative_index(&arg(args, 1), len, len);
    let out = if start < end {
        elements[start..end].to_vec()
    } else {
        Vec::new()
    };
    Ok(Value::Object(ObjectRef::array(out)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_index() {
        assert_eq!(relative_index(&Value::Undefined, 5, 5), 5);
        assert_eq!(relative_index(&Value::from(-2), 5, 0), 3);
        assert_eq!(relative_index(&Value::from(-9), 5, 0), 0);
        assert_eq!(relative_index(&Value::from(9), 5, 0), 5);
        assert_eq!(relative_index(&Value::Number(1.7), 5, 0), 1);
    }
}
