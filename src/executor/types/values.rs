//! Runtime value types
//!
//! Guest values live on a single-threaded heap (`Rc`/`RefCell`). Objects keep
//! their own properties in insertion order so key enumeration matches the
//! order the guest program created them in.

use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use super::super::errors;
use super::super::evaluator::Runtime;
use super::super::pending::PendingValue;
use super::ast::FunctionRefNode;
use super::control::EvalResult;
use crate::compiler::CompiledUnit;

/* ===================== Value ===================== */

#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Object(ObjectRef),
    Function(FunctionRef),
    Native(NativeRef),
    Pending(PendingValue),
}

impl Value {
    pub fn str(s: &str) -> Value {
        Value::String(Rc::from(s))
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    /// Capability check used by the suspension broker
    pub fn is_pending(&self) -> bool {
        matches!(self, Value::Pending(_))
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Function(_) | Value::Native(_))
    }

    /// Objects and functions (anything with identity)
    pub fn is_object_like(&self) -> bool {
        matches!(
            self,
            Value::Object(_) | Value::Function(_) | Value::Native(_)
        )
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Property bag backing an object or function value
    pub fn property_holder(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(o) => Some(o),
            Value::Function(f) => Some(&f.object),
            Value::Native(n) => Some(&n.object),
            _ => None,
        }
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "object",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Object(_) | Value::Pending(_) => "object",
            Value::Function(_) | Value::Native(_) => "function",
        }
    }

    /// ToBoolean
    pub fn to_boolean(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => !(*n == 0.0 || n.is_nan()),
            Value::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    /// ToNumber
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Number(n) => *n,
            Value::String(s) => string_to_number(s),
            Value::Pending(_) => f64::NAN,
            other => string_to_number(&other.to_primitive().to_js_string()),
        }
    }

    /// ToPrimitive. User-defined `valueOf`/`toString` are not consulted.
    pub fn to_primitive(&self) -> Value {
        match self {
            Value::Object(_) | Value::Function(_) | Value::Native(_) | Value::Pending(_) => {
                Value::String(Rc::from(self.object_to_string(&mut Vec::new())))
            }
            other => other.clone(),
        }
    }

    /// ToString
    pub fn to_js_string(&self) -> String {
        match self {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => number_to_string(*n),
            Value::String(s) => s.to_string(),
            _ => self.object_to_string(&mut Vec::new()),
        }
    }

    fn object_to_string(&self, seen: &mut Vec<*const RefCell<JsObject>>) -> String {
        match self {
            Value::Object(obj) => {
                let ptr = Rc::as_ptr(&obj.0);
                if seen.contains(&ptr) {
                    return String::new();
                }
                match obj.class() {
                    ObjectClass::Array => {
                        seen.push(ptr);
                        let parts: Vec<String> = obj
                            .elements()
                            .iter()
                            .map(|v| match v {
                                Value::Undefined | Value::Null => String::new(),
                                Value::Object(_) => v.object_to_string(seen),
                                other => other.to_js_string(),
                            })
                            .collect();
                        seen.pop();
                        parts.join(",")
                    }
                    ObjectClass::Error => {
                        let name = obj
                            .get(ERROR_NAME_KEY)
                            .map(|v| v.to_js_string())
                            .unwrap_or_else(|| errors::ERROR.to_string());
                        let message = obj
                            .get(ERROR_MESSAGE_KEY)
                            .map(|v| v.to_js_string())
                            .unwrap_or_default();
                        if message.is_empty() {
                            name
                        } else {
                            format!("{}: {}", name, message)
                        }
                    }
                    ObjectClass::Object | ObjectClass::Function => "[object Object]".to_string(),
                }
            }
            Value::Function(f) => format!("function {}() {{ [guest code] }}", f.name()),
            Value::Native(n) => format!("function {}() {{ [native code] }}", n.name),
            Value::Pending(p) => format!("[object Pending {}]", p.id()),
            other => other.to_js_string(),
        }
    }

    /// Property key form of this value
    pub fn to_property_key(&self) -> Rc<str> {
        match self {
            Value::String(s) => s.clone(),
            other => Rc::from(other.to_primitive().to_js_string()),
        }
    }

    /// `===`
    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Native(a), Value::Native(b)) => Rc::ptr_eq(a, b),
            (Value::Pending(a), Value::Pending(b)) => a.id() == b.id(),
            _ => false,
        }
    }

    /// `==`
    pub fn loose_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (a, b) if a.is_nullish() && b.is_nullish() => true,
            (a, b) if a.is_nullish() || b.is_nullish() => false,
            (Value::Number(_), Value::String(_)) | (Value::String(_), Value::Number(_)) => {
                self.to_number() == other.to_number()
            }
            (Value::Bool(_), _) => Value::Number(self.to_number()).loose_equals(other),
            (_, Value::Bool(_)) => self.loose_equals(&Value::Number(other.to_number())),
            (a, b) if a.is_object_like() && !b.is_object_like() => {
                a.to_primitive().loose_equals(b)
            }
            (a, b) if !a.is_object_like() && b.is_object_like() => {
                a.loose_equals(&b.to_primitive())
            }
            _ => self.strict_equals(other),
        }
    }

    /* ===================== JSON ===================== */

    /// JSON rendering, following `JSON.stringify` conventions.
    ///
    /// Functions and `undefined` inside objects are skipped; cyclic
    /// references and non-finite numbers render as `null`.
    pub fn to_json(&self) -> serde_json::Value {
        self.to_json_inner(&mut Vec::new())
    }

    fn to_json_inner(&self, seen: &mut Vec<*const RefCell<JsObject>>) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Value::Undefined | Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(|num| {
                    if n.fract() == 0.0 && n.abs() < 9.007_199_254_740_992e15 {
                        Json::from(*n as i64)
                    } else {
                        Json::Number(num)
                    }
                })
                .unwrap_or(Json::Null),
            Value::String(s) => Json::String(s.to_string()),
            Value::Object(obj) => {
                let ptr = Rc::as_ptr(&obj.0);
                if seen.contains(&ptr) {
                    return Json::Null;
                }
                seen.push(ptr);
                let out = match obj.class() {
                    ObjectClass::Array => Json::Array(
                        obj.elements()
                            .iter()
                            .map(|v| match v {
                                Value::Function(_) | Value::Native(_) => Json::Null,
                                other => other.to_json_inner(seen),
                            })
                            .collect(),
                    ),
                    ObjectClass::Error => {
                        let mut map = serde_json::Map::new();
                        for key in [ERROR_NAME_KEY, ERROR_MESSAGE_KEY] {
                            if let Some(v) = obj.get(key) {
                                map.insert(key.to_string(), v.to_json_inner(seen));
                            }
                        }
                        Json::Object(map)
                    }
                    _ => {
                        let mut map = serde_json::Map::new();
                        for (key, value) in obj.own_entries() {
                            if matches!(
                                value,
                                Value::Undefined | Value::Function(_) | Value::Native(_)
                            ) {
                                continue;
                            }
                            map.insert(key.to_string(), value.to_json_inner(seen));
                        }
                        Json::Object(map)
                    }
                };
                seen.pop();
                out
            }
            Value::Function(_) | Value::Native(_) | Value::Pending(_) => Json::Null,
        }
    }

    /// Build a guest value from JSON. Arrays and objects get no prototype.
    pub fn from_json(json: &serde_json::Value) -> Value {
        use serde_json::Value as Json;
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(*b),
            Json::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            Json::String(s) => Value::str(s),
            Json::Array(items) => {
                Value::Object(ObjectRef::array(items.iter().map(Value::from_json).collect()))
            }
            Json::Object(map) => {
                let obj = ObjectRef::plain(None);
                for (k, v) in map {
                    obj.set(k, Value::from_json(v));
                }
                Value::Object(obj)
            }
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::str(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<ObjectRef> for Value {
    fn from(obj: ObjectRef) -> Self {
        Value::Object(obj)
    }
}

impl From<PendingValue> for Value {
    fn from(p: PendingValue) -> Self {
        Value::Pending(p)
    }
}

/// Same-value comparison for host code and tests (`NaN` equals itself)
impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) if a.is_nan() && b.is_nan() => true,
            _ => self.strict_equals(other),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", number_to_string(*n)),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Object(_) => write!(f, "{}", self.to_json()),
            Value::Function(func) => write!(f, "[Function {}]", func.internal_name()),
            Value::Native(n) => write!(f, "[Native {}]", n.name),
            Value::Pending(p) => write!(f, "[Pending {}]", p.id()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_js_string())
    }
}

/* ===================== Number Conversions ===================== */

/// Number → string the way the guest language prints numbers
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    let abs = n.abs();
    if abs >= 1e21 || abs < 1e-6 {
        let formatted = format!("{:e}", n);
        return match formatted.split_once('e') {
            Some((mantissa, exp)) if !exp.starts_with('-') => format!("{}e+{}", mantissa, exp),
            _ => formatted,
        };
    }
    if n.fract() == 0.0 && abs < 1e21 {
        return format!("{:.0}", n);
    }
    format!("{}", n)
}

/// String → number (`Number("...")` semantics)
pub fn string_to_number(s: &str) -> f64 {
    let t = s.trim();
    if t.is_empty() {
        return 0.0;
    }
    match t {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    let radix = match t.get(..2) {
        Some("0x") | Some("0X") => Some(16),
        Some("0o") | Some("0O") => Some(8),
        Some("0b") | Some("0B") => Some(2),
        _ => None,
    };
    if let Some(radix) = radix {
        return u64::from_str_radix(&t[2..], radix)
            .map(|v| v as f64)
            .unwrap_or(f64::NAN);
    }
    if !t
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'))
    {
        return f64::NAN;
    }
    t.parse::<f64>().unwrap_or(f64::NAN)
}

/// ToInt32
pub fn to_int32(n: f64) -> i32 {
    to_uint32(n) as i32
}

/// ToUint32
pub fn to_uint32(n: f64) -> u32 {
    if !n.is_finite() {
        return 0;
    }
    let m = n.trunc().rem_euclid(4_294_967_296.0);
    m as u32
}

/// Canonical array index form of a property key
pub fn array_index(key: &str) -> Option<usize> {
    if key.is_empty() || (key.len() > 1 && key.starts_with('0')) {
        return None;
    }
    if !key.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    key.parse().ok().filter(|&idx| idx < MAX_ARRAY_LENGTH)
}

/// 2^32 - 1; larger integer keys are ordinary property names
pub const MAX_ARRAY_LENGTH: usize = 4_294_967_295;

/// Array writes further than this past the dense prefix are stored sparsely
const MAX_DENSE_GAP: usize = 1024;

/* ===================== Objects ===================== */

pub const ERROR_NAME_KEY: &str = "name";
pub const ERROR_MESSAGE_KEY: &str = "message";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectClass {
    Object,
    Array,
    Error,
    Function,
}

#[derive(Clone)]
struct Property {
    key: Rc<str>,
    value: Value,
    enumerable: bool,
}

pub struct JsObject {
    pub class: ObjectClass,
    properties: Vec<Property>,
    /// Dense prefix of an array's indexed elements
    elements: Vec<Value>,
    /// Array length. Indices at or past `elements.len()` that hold a value
    /// are kept in `properties` under their canonical key.
    length: usize,
    pub proto: Option<ObjectRef>,
}

impl JsObject {
    pub fn new(class: ObjectClass, proto: Option<ObjectRef>) -> Self {
        Self {
            class,
            properties: Vec::new(),
            elements: Vec::new(),
            length: 0,
            proto,
        }
    }

    fn find(&self, key: &str) -> Option<usize> {
        self.properties.iter().position(|p| &*p.key == key)
    }

    fn is_array(&self) -> bool {
        self.class == ObjectClass::Array
    }

    fn get_own(&self, key: &str) -> Option<Value> {
        if self.is_array() {
            if key == "length" {
                return Some(Value::Number(self.length as f64));
            }
            if let Some(value) = array_index(key).and_then(|idx| self.elements.get(idx)) {
                return Some(value.clone());
            }
        }
        self.find(key).map(|i| self.properties[i].value.clone())
    }

    fn has_own(&self, key: &str) -> bool {
        if self.is_array() {
            if key == "length" {
                return true;
            }
            if array_index(key).map_or(false, |idx| idx < self.elements.len()) {
                return true;
            }
        }
        self.find(key).is_some()
    }

    fn put(&mut self, key: &str, value: Value, enumerable: bool) {
        if self.is_array() {
            if key == "length" {
                self.set_length(to_uint32(value.to_number()) as usize);
                return;
            }
            if let Some(idx) = array_index(key) {
                self.put_index(idx, value);
                return;
            }
        }
        self.put_property(Rc::from(key), value, enumerable);
    }

    fn put_property(&mut self, key: Rc<str>, value: Value, enumerable: bool) {
        match self.find(&key) {
            Some(i) => self.properties[i].value = value,
            None => self.properties.push(Property {
                key,
                value,
                enumerable,
            }),
        }
    }

    fn put_index(&mut self, idx: usize, value: Value) {
        let dense = self.elements.len();
        if idx < dense {
            self.elements[idx] = value;
        } else if idx - dense <= MAX_DENSE_GAP {
            self.elements.resize(idx, Value::Undefined);
            self.elements.push(value);
            self.absorb_sparse();
        } else {
            self.put_property(Rc::from(idx.to_string()), value, true);
        }
        self.length = self.length.max(idx + 1);
    }

    /// Move sparse entries the dense prefix now reaches into it
    fn absorb_sparse(&mut self) {
        let mut i = 0;
        while i < self.properties.len() {
            match array_index(&self.properties[i].key) {
                Some(idx) if idx <= self.elements.len() => {
                    let prop = self.properties.remove(i);
                    if idx == self.elements.len() {
                        self.elements.push(prop.value);
                    } else {
                        self.elements[idx] = prop.value;
                    }
                    // An append can make an entry already passed over contiguous
                    i = 0;
                }
                _ => i += 1,
            }
        }
    }

    fn set_length(&mut self, len: usize) {
        self.elements.truncate(len);
        self.properties
            .retain(|p| array_index(&p.key).map_or(true, |idx| idx < len));
        self.length = len;
    }

    /// Stored sparse entries in index order
    fn sparse_entries(&self) -> Vec<(usize, &Property)> {
        if !self.is_array() {
            return Vec::new();
        }
        let mut entries: Vec<(usize, &Property)> = self
            .properties
            .iter()
            .filter_map(|p| array_index(&p.key).map(|idx| (idx, p)))
            .collect();
        entries.sort_by_key(|(idx, _)| *idx);
        entries
    }

    fn named_properties(&self) -> impl Iterator<Item = &Property> {
        let is_array = self.is_array();
        self.properties
            .iter()
            .filter(move |p| p.enumerable && !(is_array && array_index(&p.key).is_some()))
    }

    fn indexed_values(&self) -> Vec<Value> {
        if self.length - self.elements.len() <= MAX_DENSE_GAP {
            (0..self.length)
                .map(|idx| match self.elements.get(idx) {
                    Some(v) => v.clone(),
                    None => self.get_own(&idx.to_string()).unwrap_or_default(),
                })
                .collect()
        } else {
            let mut values = self.elements.clone();
            values.extend(self.sparse_entries().into_iter().map(|(_, p)| p.value.clone()));
            values
        }
    }
}

/// Shared handle to a guest object
#[derive(Clone)]
pub struct ObjectRef(Rc<RefCell<JsObject>>);

impl ObjectRef {
    pub fn new(obj: JsObject) -> Self {
        ObjectRef(Rc::new(RefCell::new(obj)))
    }

    pub fn plain(proto: Option<ObjectRef>) -> Self {
        Self::new(JsObject::new(ObjectClass::Object, proto))
    }

    pub fn array(elements: Vec<Value>) -> Self {
        let mut obj = JsObject::new(ObjectClass::Array, None);
        obj.length = elements.len();
        obj.elements = elements;
        Self::new(obj)
    }

    pub fn error(name: &str, message: &str) -> Self {
        let mut obj = JsObject::new(ObjectClass::Error, None);
        obj.put(ERROR_NAME_KEY, Value::str(name), false);
        obj.put(ERROR_MESSAGE_KEY, Value::str(message), false);
        Self::new(obj)
    }

    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Identity of the underlying object
    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }

    pub(crate) fn strong_count(&self) -> usize {
        Rc::strong_count(&self.0)
    }

    /// Every value this object holds, hidden properties and prototype included
    pub(crate) fn held_values(&self) -> Vec<Value> {
        let inner = self.0.borrow();
        let mut values = inner.elements.clone();
        values.extend(inner.properties.iter().map(|p| p.value.clone()));
        values.extend(inner.proto.clone().map(Value::Object));
        values
    }

    pub fn borrow(&self) -> Ref<'_, JsObject> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, JsObject> {
        self.0.borrow_mut()
    }

    pub fn class(&self) -> ObjectClass {
        self.0.borrow().class
    }

    pub fn is_array(&self) -> bool {
        self.class() == ObjectClass::Array
    }

    pub fn proto(&self) -> Option<ObjectRef> {
        self.0.borrow().proto.clone()
    }

    /// Property lookup along the prototype chain
    pub fn get(&self, key: &str) -> Option<Value> {
        let mut current = Some(self.clone());
        while let Some(obj) = current {
            let inner = obj.0.borrow();
            if let Some(v) = inner.get_own(key) {
                return Some(v);
            }
            current = inner.proto.clone();
        }
        None
    }

    pub fn get_own(&self, key: &str) -> Option<Value> {
        self.0.borrow().get_own(key)
    }

    pub fn has(&self, key: &str) -> bool {
        let mut current = Some(self.clone());
        while let Some(obj) = current {
            let inner = obj.0.borrow();
            if inner.has_own(key) {
                return true;
            }
            current = inner.proto.clone();
        }
        false
    }

    pub fn has_own(&self, key: &str) -> bool {
        self.0.borrow().has_own(key)
    }

    /// Writes an own property; never touches the prototype chain
    pub fn set(&self, key: &str, value: Value) {
        self.0.borrow_mut().put(key, value, true);
    }

    /// Writes an own property that key enumeration skips
    pub fn define_hidden(&self, key: &str, value: Value) {
        self.0.borrow_mut().put(key, value, false);
    }

    pub fn delete(&self, key: &str) -> bool {
        let mut inner = self.0.borrow_mut();
        if inner.is_array() {
            if let Some(idx) = array_index(key) {
                if idx < inner.elements.len() {
                    inner.elements[idx] = Value::Undefined;
                    return true;
                }
            }
        }
        if let Some(i) = inner.find(key) {
            inner.properties.remove(i);
        }
        true
    }

    /// Own enumerable keys: array indices first (ascending), then
    /// properties in insertion order
    pub fn own_keys(&self) -> Vec<Rc<str>> {
        self.own_entries().into_iter().map(|(key, _)| key).collect()
    }

    /// Own enumerable (key, value) pairs in key order
    pub fn own_entries(&self) -> Vec<(Rc<str>, Value)> {
        let inner = self.0.borrow();
        let mut entries: Vec<(Rc<str>, Value)> = inner
            .elements
            .iter()
            .enumerate()
            .map(|(i, v)| (Rc::from(i.to_string()), v.clone()))
            .collect();
        entries.extend(
            inner
                .sparse_entries()
                .into_iter()
                .map(|(_, p)| (p.key.clone(), p.value.clone())),
        );
        entries.extend(
            inner
                .named_properties()
                .map(|p| (p.key.clone(), p.value.clone())),
        );
        entries
    }

    /// Enumerable keys along the whole prototype chain, own keys first
    pub fn enumerable_keys(&self) -> Vec<Rc<str>> {
        let mut keys: Vec<Rc<str>> = Vec::new();
        let mut current = Some(self.clone());
        while let Some(obj) = current {
            for key in obj.own_keys() {
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
            current = obj.proto();
        }
        keys
    }

    /// Indexed values of an array in index order. Holes read as
    /// `undefined`; an array too sparse to materialize yields only the
    /// values it stores.
    pub fn elements(&self) -> Vec<Value> {
        self.0.borrow().indexed_values()
    }

    pub fn array_length(&self) -> usize {
        self.0.borrow().length
    }

    /// Append to an array, returning the new length
    pub fn push_elements(&self, values: &[Value]) -> usize {
        let mut inner = self.0.borrow_mut();
        for value in values {
            let idx = inner.length;
            if idx >= MAX_ARRAY_LENGTH {
                break;
            }
            inner.put_index(idx, value.clone());
        }
        inner.length
    }

    /// Remove and return the last element of an array
    pub fn pop_element(&self) -> Value {
        let mut inner = self.0.borrow_mut();
        let Some(last) = inner.length.checked_sub(1) else {
            return Value::Undefined;
        };
        let value = inner.get_own(&last.to_string()).unwrap_or_default();
        inner.set_length(last);
        value
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", Value::Object(self.clone()))
    }
}

/* ===================== Functions ===================== */

/// Engine-assigned identity of a function value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionId(pub u64);

/// A guest function value: one evaluation of a function literal
pub struct Closure {
    pub id: FunctionId,
    pub node: FunctionRefNode,
    pub unit: Rc<CompiledUnit>,
    /// Own properties (`prototype` is created on first access)
    pub object: ObjectRef,
}

pub type FunctionRef = Rc<Closure>;

impl Closure {
    pub fn new(id: FunctionId, node: FunctionRefNode, unit: Rc<CompiledUnit>) -> Self {
        Self {
            id,
            node,
            unit,
            object: ObjectRef::new(JsObject::new(ObjectClass::Function, None)),
        }
    }

    /// Guest-visible name (empty for anonymous literals)
    pub fn name(&self) -> &str {
        self.node.name.as_deref().unwrap_or("")
    }

    /// Name used for call-stack bookkeeping; anonymous literals get a synthetic one
    pub fn internal_name(&self) -> &str {
        self.unit
            .record(self.node.id)
            .map(|r| r.name.as_str())
            .unwrap_or_else(|| self.name())
    }

    /// The `prototype` object used by `new` and `instanceof`
    pub fn prototype_object(&self) -> ObjectRef {
        if let Some(Value::Object(proto)) = self.object.get_own("prototype") {
            return proto;
        }
        let proto = ObjectRef::plain(None);
        self.object
            .define_hidden("prototype", Value::Object(proto.clone()));
        proto
    }

    /// Source text of the literal this closure came from
    pub fn source_text(&self) -> &str {
        self.unit
            .source
            .get(self.node.span.start..self.node.span.end)
            .unwrap_or("")
    }
}

/// Host function signature: runtime, `this`, arguments
pub type NativeFn = fn(&Runtime, &Value, &[Value]) -> EvalResult;

pub struct NativeFunction {
    pub name: Rc<str>,
    pub func: NativeFn,
    pub constructible: bool,
    pub object: ObjectRef,
}

pub type NativeRef = Rc<NativeFunction>;

impl NativeFunction {
    pub fn new(name: &str, func: NativeFn) -> NativeRef {
        Rc::new(Self {
            name: Rc::from(name),
            func,
            constructible: false,
            object: ObjectRef::new(JsObject::new(ObjectClass::Function, None)),
        })
    }

    pub fn constructor(name: &str, func: NativeFn) -> NativeRef {
        Rc::new(Self {
            name: Rc::from(name),
            func,
            constructible: true,
            object: ObjectRef::new(JsObject::new(ObjectClass::Function, None)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_formatting() {
        assert_eq!(number_to_string(3.0), "3");
        assert_eq!(number_to_string(-0.0), "0");
        assert_eq!(number_to_string(0.5), "0.5");
        assert_eq!(number_to_string(f64::NAN), "NaN");
        assert_eq!(number_to_string(f64::NEG_INFINITY), "-Infinity");
        assert_eq!(number_to_string(1e21), "1e+21");
    }

    #[test]
    fn test_string_to_number() {
        assert_eq!(string_to_number("  42 "), 42.0);
        assert_eq!(string_to_number(""), 0.0);
        assert_eq!(string_to_number("0x1f"), 31.0);
        assert!(string_to_number("12px").is_nan());
        assert!(string_to_number("inf").is_nan());
    }

    #[test]
    fn test_loose_equality() {
        assert!(Value::from(1).loose_equals(&Value::from("1")));
        assert!(Value::Null.loose_equals(&Value::Undefined));
        assert!(!Value::Null.loose_equals(&Value::from(0)));
        assert!(Value::from(true).loose_equals(&Value::from(1)));
        assert!(!Value::from("a").strict_equals(&Value::from("b")));
    }

    #[test]
    fn test_array_object_keys_and_length() {
        let arr = ObjectRef::array(vec![Value::from(1), Value::from(2)]);
        arr.set("5", Value::from(9));
        assert_eq!(arr.get("length"), Some(Value::from(6)));
        arr.set("length", Value::from(1));
        assert_eq!(arr.own_keys().len(), 1);
        assert_eq!(Value::Object(arr).to_js_string(), "1");
    }

    #[test]
    fn test_sparse_entries_join_dense_prefix_when_reached() {
        let arr = ObjectRef::array(vec![]);
        arr.set("2000", Value::from("far"));
        assert_eq!(arr.borrow().elements.len(), 0);
        assert_eq!(arr.array_length(), 2001);

        arr.set("1000", Value::from(1));
        arr.set("1999", Value::from(2));
        assert_eq!(arr.borrow().elements.len(), 2001);
        assert_eq!(arr.get("2000"), Some(Value::from("far")));
        assert_eq!(arr.own_keys().len(), 2001);

        assert_eq!(arr.pop_element(), Value::from("far"));
        assert_eq!(arr.array_length(), 2000);
    }

    #[test]
    fn test_to_json_handles_cycles() {
        let obj = ObjectRef::plain(None);
        obj.set("a", Value::from(1));
        obj.set("self", Value::Object(obj.clone()));
        let json = Value::Object(obj).to_json();
        assert_eq!(json, serde_json::json!({"a": 1, "self": null}));
    }

    #[test]
    fn test_prototype_chain_lookup() {
        let base = ObjectRef::plain(None);
        base.set("shared", Value::from("base"));
        let derived = ObjectRef::plain(Some(base.clone()));
        derived.set("own", Value::from(1));
        assert_eq!(derived.get("shared"), Some(Value::from("base")));
        assert!(!derived.has_own("shared"));
        let keys: Vec<String> = derived
            .enumerable_keys()
            .iter()
            .map(|k| k.to_string())
            .collect();
        assert_eq!(keys, vec!["own", "shared"]);
    }
}
