//! Lexical scopes
//!
//! A [`Scope`] is the binding record of one function activation, chained to
//! the scope the function was defined in. The root scope has no parent and
//! stores its bindings on the guest global object.
//!
//! The activation reads and writes its variables through the same cells the
//! scope exposes, so [`Scope::get_environment`] and [`Scope::set_environment`]
//! observe and affect exactly what the running (or suspended) activation sees.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use thiserror::Error;

use super::links::LinkTable;
use super::types::{FunctionRef, ObjectRef, Value};
use crate::compiler::{GLOBAL_NAME, RESERVED_NAMES, ROOT_FUNCTION_NAME};
use crate::engine::Engine;
use crate::error::EngineResult;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScopeError {
    /// Reported to guests as a SyntaxError
    #[error("invalid identifier '{0}'")]
    InvalidName(String),

    /// Reported to guests as a ReferenceError
    #[error("{0} is not defined")]
    Unbound(String),
}

/// `^[$A-Za-z_][$0-9A-Za-z_]*$`
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

struct Binding {
    name: Rc<str>,
    cell: RefCell<Value>,
}

enum Storage {
    /// Root scope: bindings are properties of the global object
    Global(ObjectRef),
    /// Sealed at creation; values change, names never do
    Local(Vec<Binding>),
}

pub struct Scope {
    parent: Option<Rc<Scope>>,
    owner: Rc<str>,
    storage: Storage,
    this_value: Value,
    links: Weak<LinkTable>,
}

impl Scope {
    /// The root scope over a guest global object
    pub(crate) fn root(global: ObjectRef, links: &Rc<LinkTable>) -> Rc<Scope> {
        Rc::new(Scope {
            parent: None,
            owner: Rc::from(ROOT_FUNCTION_NAME),
            this_value: Value::Object(global.clone()),
            storage: Storage::Global(global),
            links: Rc::downgrade(links),
        })
    }

    /// Child scope for one activation of `owner`, sealed over `bindings`
    pub fn create(
        parent: &Rc<Scope>,
        owner: &str,
        bindings: Vec<(Rc<str>, Value)>,
        this_value: Value,
    ) -> Rc<Scope> {
        let bindings = bindings
            .into_iter()
            .map(|(name, value)| Binding {
                name,
                cell: RefCell::new(value),
            })
            .collect();
        Rc::new(Scope {
            parent: Some(parent.clone()),
            owner: Rc::from(owner),
            storage: Storage::Local(bindings),
            this_value,
            links: parent.links.clone(),
        })
    }

    pub fn parent(&self) -> Option<&Rc<Scope>> {
        self.parent.as_ref()
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Name of the function this scope belongs to
    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn this_value(&self) -> Value {
        self.this_value.clone()
    }

    /// True if this scope itself holds `name`
    pub fn declares(&self, name: &str) -> bool {
        match &self.storage {
            Storage::Global(global) => global.has(name),
            Storage::Local(bindings) => bindings.iter().any(|b| &*b.name == name),
        }
    }

    fn local_cell(&self, name: &str) -> Option<&RefCell<Value>> {
        match &self.storage {
            Storage::Local(bindings) => bindings
                .iter()
                .find(|b| &*b.name == name)
                .map(|b| &b.cell),
            Storage::Global(_) => None,
        }
    }

    /// Resolve `name` along the parent chain
    pub fn get(&self, name: &str) -> Result<Value, ScopeError> {
        if !is_valid_name(name) {
            return Err(ScopeError::InvalidName(name.to_string()));
        }
        let mut scope = self;
        loop {
            match &scope.storage {
                Storage::Local(_) => {
                    if let Some(cell) = scope.local_cell(name) {
                        return Ok(cell.borrow().clone());
                    }
                }
                Storage::Global(global) => {
                    return match name {
                        GLOBAL_NAME => Ok(Value::Object(global.clone())),
                        "undefined" => Ok(Value::Undefined),
                        "NaN" => Ok(Value::Number(f64::NAN)),
                        _ => global
                            .get(name)
                            .ok_or_else(|| ScopeError::Unbound(name.to_string())),
                    };
                }
            }
            match &scope.parent {
                Some(parent) => scope = parent.as_ref(),
                None => return Err(ScopeError::Unbound(name.to_string())),
            }
        }
    }

    /// Write `name` in the nearest scope that declares it. Names no local
    /// scope declares land on the global object.
    pub fn set(&self, name: &str, value: Value) -> Result<(), ScopeError> {
        if !is_valid_name(name) {
            return Err(ScopeError::InvalidName(name.to_string()));
        }
        let mut scope = self;
        loop {
            match &scope.storage {
                Storage::Local(_) => {
                    if let Some(cell) = scope.local_cell(name) {
                        *cell.borrow_mut() = value;
                        return Ok(());
                    }
                }
                Storage::Global(global) => {
                    if !RESERVED_NAMES.contains(&name) {
                        global.set(name, value);
                    }
                    return Ok(());
                }
            }
            match &scope.parent {
                Some(parent) => scope = parent.as_ref(),
                None => return Err(ScopeError::Unbound(name.to_string())),
            }
        }
    }

    /// True if `name` resolves somewhere in this chain. The reserved
    /// intrinsics resolve only through the root.
    pub fn has(&self, name: &str) -> bool {
        if !is_valid_name(name) {
            return false;
        }
        match &self.storage {
            Storage::Global(global) => RESERVED_NAMES.contains(&name) || global.has(name),
            Storage::Local(_) => {
                self.declares(name)
                    || self.parent.as_ref().map(|p| p.has(name)).unwrap_or(false)
            }
        }
    }

    /// Names bound by the local scopes of this chain, innermost first
    pub fn visible_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        let mut scope = Some(self);
        while let Some(current) = scope {
            if let Storage::Local(bindings) = &current.storage {
                for binding in bindings {
                    if !names.iter().any(|n| n.as_str() == &*binding.name) {
                        names.push(binding.name.to_string());
                    }
                }
            }
            scope = current.parent.as_deref();
        }
        names
    }

    /// True if this scope links its closures into `links`
    pub(crate) fn belongs_to(&self, links: &Rc<LinkTable>) -> bool {
        self.links
            .upgrade()
            .map(|table| Rc::ptr_eq(&table, links))
            .unwrap_or(false)
    }

    /// Evaluate `code` on `engine` as if it were written inside this scope.
    /// Reads and writes go through the live bindings; names the chain does
    /// not bind resolve against the global object.
    pub async fn eval(self: &Rc<Self>, engine: &Engine, code: &str) -> EngineResult<Value> {
        engine.eval_in(self, code).await
    }

    /// Record this scope as the defining environment of `closure`.
    /// Returns false if the closure was already linked.
    pub fn link(self: &Rc<Self>, closure: &FunctionRef) -> bool {
        match self.links.upgrade() {
            Some(table) => table.associate(closure, self),
            None => false,
        }
    }

    /// Values this scope holds: bindings, `this` and the global object
    pub(crate) fn held_values(&self) -> Vec<Value> {
        let mut values = vec![self.this_value.clone()];
        match &self.storage {
            Storage::Local(bindings) => {
                values.extend(bindings.iter().map(|b| b.cell.borrow().clone()))
            }
            Storage::Global(global) => values.push(Value::Object(global.clone())),
        }
        values
    }

    /// Reset every local binding to `undefined`
    pub(crate) fn clear_bindings(&self) {
        if let Storage::Local(bindings) = &self.storage {
            for binding in bindings {
                *binding.cell.borrow_mut() = Value::Undefined;
            }
        }
    }

    /// Snapshot of this scope's own bindings
    pub fn get_environment(&self) -> HashMap<String, Value> {
        match &self.storage {
            Storage::Local(bindings) => bindings
                .iter()
                .map(|b| (b.name.to_string(), b.cell.borrow().clone()))
                .collect(),
            Storage::Global(global) => global
                .own_entries()
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        }
    }

    /// Names of this scope's own bindings, in declaration order
    pub fn binding_names(&self) -> Vec<String> {
        match &self.storage {
            Storage::Local(bindings) => bindings.iter().map(|b| b.name.to_string()).collect(),
            Storage::Global(global) => global.own_keys().iter().map(|k| k.to_string()).collect(),
        }
    }

    /// Overwrite existing own bindings from `env`. Unknown names are ignored.
    /// Returns how many bindings were written.
    pub fn set_environment(&self, env: &HashMap<String, Value>) -> usize {
        let mut written = 0;
        for (name, value) in env {
            match &self.storage {
                Storage::Local(_) => {
                    if let Some(cell) = self.local_cell(name) {
                        *cell.borrow_mut() = value.clone();
                        written += 1;
                    }
                }
                Storage::Global(global) => {
                    if global.has_own(name) {
                        global.set(name, value.clone());
                        written += 1;
                    }
                }
            }
        }
        written
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("owner", &self.owner)
            .field("bindings", &self.binding_names())
            .field("root", &self.is_root())
            .finish()
    }
}
