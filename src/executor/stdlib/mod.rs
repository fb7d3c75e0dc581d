//! Standard library function implementations
//!
//! Host functions are plain `fn` pointers ([`NativeFn`]) grouped by
//! category. [`inject_stdlib`] installs them on an engine's global object as
//! non-enumerable properties, so guest key enumeration never sees them.

pub mod array;
pub mod globals;
pub mod math;
pub mod time;

use super::errors;
use super::evaluator::Runtime;
use super::types::{Control, NativeFn, NativeFunction, ObjectRef, Value};
use crate::compiler::EVAL_NAME;

/* ===================== Argument Helpers ===================== */

/// Argument `i`, or `undefined` when absent
pub(crate) fn arg(args: &[Value], i: usize) -> Value {
    args.get(i).cloned().unwrap_or_default()
}

/// Fail with a TypeError unless at least `min` arguments were passed
pub(crate) fn expect_args(rt: &Runtime, name: &str, args: &[Value], min: usize) -> Result<(), Control> {
    if args.len() < min {
        return Err(rt.type_error(format!(
            "{}: expected at least {} arguments, got {}",
            name,
            min,
            args.len()
        )));
    }
    Ok(())
}

fn method(obj: &ObjectRef, name: &str, func: NativeFn) {
    obj.define_hidden(name, Value::Native(NativeFunction::new(name, func)));
}

fn constructor(obj: &ObjectRef, name: &str, func: NativeFn) {
    obj.define_hidden(name, Value::Native(NativeFunction::constructor(name, func)));
}

/* ===================== Environment Injection ===================== */

/// Install the standard library on `rt`'s global object and array methods
pub fn inject_stdlib(rt: &Runtime) {
    let global = rt.global();

    global.define_hidden("Math", Value::Object(math::object()));
    global.define_hidden("Infinity", Value::Number(f64::INFINITY));

    let object = ObjectRef::plain(None);
    method(&object, "keys", globals::object_keys);
    global.define_hidden("Object", Value::Object(object));

    let array = ObjectRef::plain(None);
    method(&array, "isArray", globals::array_is_array);
    global.define_hidden("Array", Value::Object(array));

    let json = ObjectRef::plain(None);
    method(&json, "stringify", globals::json_stringify);
    method(&json, "parse", globals::json_parse);
    global.define_hidden("JSON", Value::Object(json));

    let console = ObjectRef::plain(None);
    method(&console, "log", globals::console_log);
    global.define_hidden("console", Value::Object(console));

    method(global, "String", globals::to_string);
    method(global, "Number", globals::to_number);
    method(global, "Boolean", globals::to_boolean);
    method(global, "isNaN", globals::is_nan);
    method(global, "parseInt", globals::parse_int);
    method(global, "parseFloat", globals::parse_float);
    method(global, "delay", time::delay);
    global.define_hidden(EVAL_NAME, Value::Native(rt.eval_function().clone()));

    constructor(global, errors::ERROR, globals::error);
    constructor(global, errors::TYPE_ERROR, globals::type_error);
    constructor(global, errors::REFERENCE_ERROR, globals::reference_error);
    constructor(global, errors::RANGE_ERROR, globals::range_error);
    constructor(global, errors::SYNTAX_ERROR, globals::syntax_error);

    let methods = rt.array_methods();
    method(methods, "push", array::push);
    method(methods, "pop", array::pop);
    method(methods, "join", array::join);
    method(methods, "indexOf", array::index_of);
    method(methods, "slice", array::slice);

    tracing::debug!(engine = %rt.name(), "Installed stdlib");
}
