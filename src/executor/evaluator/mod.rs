//! # Evaluator - async tree walker
//!
//! Every node evaluates to an [`EvalFuture`]. A value becomes visible to the
//! rest of the program only after passing [`Runtime::resolve`], the single
//! resolution checkpoint: settled pending values are unwrapped there, and
//! unsettled ones suspend the evaluation until the engine resumes it.
//!
//! Non-local exits travel as [`Control`] on the error side of the result and
//! are absorbed by the construct that owns them (function boundary, loop,
//! labeled statement).

use std::cell::Cell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use super::call_stack::CallStack;
use super::errors;
use super::links::LinkTable;
use super::pending::Settlement;
use super::scope::{Scope, ScopeError};
use super::stdlib::globals;
use super::suspension::{SuspensionBroker, Touch};
use super::types::{
    array_index, Closure, Control, EvalFuture, EvalResult, FunctionId, FunctionRef, NativeFunction,
    NativeRef, NodeId, ObjectRef, Value,
};
use crate::compiler::{self, CompiledUnit, EVAL_NAME};
use crate::config::EngineConfig;
use crate::error::EngineError;

mod expressions;
mod operators;
mod statements;

/// Remaining stack below which an activation moves to a fresh segment
const STACK_RED_ZONE: usize = 128 * 1024;
/// Size of each fresh stack segment
const STACK_GROW_SIZE: usize = 4 * 1024 * 1024;

/// Polls and drops the wrapped activation on a fresh stack segment when the
/// current one runs low
struct GrowStack<'a> {
    inner: Option<EvalFuture<'a>>,
}

impl<'a> GrowStack<'a> {
    fn wrap(inner: EvalFuture<'a>) -> EvalFuture<'a> {
        Box::pin(GrowStack { inner: Some(inner) })
    }
}

impl Future for GrowStack<'_> {
    type Output = EvalResult;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<EvalResult> {
        let this = self.get_mut();
        match this.inner.as_mut() {
            Some(inner) => {
                let ready = stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || {
                    inner.as_mut().poll(cx)
                });
                if ready.is_ready() {
                    this.inner = None;
                }
                ready
            }
            None => Poll::Pending,
        }
    }
}

impl Drop for GrowStack<'_> {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take() {
            stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, move || drop(inner));
        }
    }
}

/// Per-engine interpreter state. Single-threaded; one evaluation at a time.
pub struct Runtime {
    name: String,
    pub(crate) config: EngineConfig,
    global: ObjectRef,
    root: Rc<Scope>,
    pub(crate) stack: CallStack,
    pub(crate) broker: SuspensionBroker,
    pub(crate) links: Rc<LinkTable>,
    next_function_id: Cell<u64>,
    /// Methods shared by every array value
    array_methods: ObjectRef,
    /// The guest `eval`; calls to it run in the caller's scope
    eval_function: NativeRef,
}

impl Runtime {
    pub fn new(name: &str, config: EngineConfig, global: ObjectRef) -> Self {
        let links = LinkTable::new();
        let root = Scope::root(global.clone(), &links);
        Self {
            name: name.to_string(),
            config,
            global,
            root,
            stack: CallStack::new(),
            broker: SuspensionBroker::new(),
            links,
            next_function_id: Cell::new(1),
            array_methods: ObjectRef::plain(None),
            eval_function: NativeFunction::new(EVAL_NAME, globals::eval),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn global(&self) -> &ObjectRef {
        &self.global
    }

    pub fn root_scope(&self) -> &Rc<Scope> {
        &self.root
    }

    pub(crate) fn eval_function(&self) -> &NativeRef {
        &self.eval_function
    }

    pub(crate) fn array_methods(&self) -> &ObjectRef {
        &self.array_methods
    }

    /* ===================== Errors ===================== */

    /// Guest exception of the given kind
    pub fn throw_error(&self, kind: &str, message: impl AsRef<str>) -> Control {
        Control::Throw(Value::Object(ObjectRef::error(kind, message.as_ref())))
    }

    pub fn type_error(&self, message: impl AsRef<str>) -> Control {
        self.throw_error(errors::TYPE_ERROR, message)
    }

    pub(crate) fn scope_error(&self, err: ScopeError) -> Control {
        match err {
            ScopeError::Unbound(name) => {
                self.throw_error(errors::REFERENCE_ERROR, format!("{} is not defined", name))
            }
            ScopeError::InvalidName(name) => self.throw_error(
                errors::SYNTAX_ERROR,
                format!("'{}' is not a valid identifier", name),
            ),
        }
    }

    /* ===================== Resolution Checkpoint ===================== */

    /// Unwrap `value` if it is a pending value.
    ///
    /// Settled values are unwrapped in place (rejections become a guest
    /// throw). An unsettled value is reported to the broker; while a watch
    /// is armed this suspends until the engine delivers the settlement.
    pub async fn resolve(&self, value: Value) -> EvalResult {
        let mut value = value;
        loop {
            let settlement = match &value {
                Value::Pending(pending) => match pending.settlement() {
                    Some(settlement) => settlement,
                    None => {
                        let touch = self.broker.touch(pending, || {
                            self.stack.positions(self.config.stack_trace_limit)
                        })?;
                        match touch {
                            Touch::Suspended(resume) => {
                                resume.await.map_err(|_| EngineError::SuspensionLost)?
                            }
                            Touch::Unwatched => return Ok(Value::Pending(pending.clone())),
                        }
                    }
                },
                _ => return Ok(value),
            };
            value = match settlement {
                Settlement::Fulfilled(v) => v,
                Settlement::Rejected(reason) => return Err(Control::Throw(reason)),
            };
        }
    }

    /* ===================== Functions ===================== */

    fn next_function_id(&self) -> FunctionId {
        let id = self.next_function_id.get();
        self.next_function_id.set(id + 1);
        FunctionId(id)
    }

    /// Produce a function value for literal `node` of `unit` and link it to
    /// the innermost activation
    pub(crate) fn instantiate(
        &self,
        unit: &Rc<CompiledUnit>,
        node: NodeId,
    ) -> Result<FunctionRef, Control> {
        let func = unit.function(node).cloned().ok_or_else(|| EngineError::LinkDesync {
            function: self
                .stack
                .top()
                .map(|f| f.function_name.to_string())
                .unwrap_or_default(),
            node,
            detail: "no function literal with this id".to_string(),
        })?;
        let closure = Rc::new(Closure::new(self.next_function_id(), func, unit.clone()));
        self.stack.link(&closure)?;
        Ok(closure)
    }

    /// Create the innermost activation's function declarations and bind them
    fn hoist_declarations(&self, unit: &Rc<CompiledUnit>, record: NodeId) -> Result<(), Control> {
        let hoisted = match unit.record(record) {
            Some(r) => r.hoisted.clone(),
            None => return Ok(()),
        };
        if hoisted.is_empty() {
            return Ok(());
        }
        let scope = self.stack.current_scope()?;
        for id in hoisted {
            let closure = self.instantiate(unit, id)?;
            let Some(name) = closure.node.name.clone() else {
                continue;
            };
            if scope.is_root() {
                self.global.set(&name, Value::Function(closure));
            } else if record == NodeId::ROOT || scope.declares(&name) {
                scope
                    .set(&name, Value::Function(closure))
                    .map_err(|e| self.scope_error(e))?;
            }
        }
        Ok(())
    }

    /// Evaluate a whole unit as a top-level program against the root scope
    pub async fn run_program(&self, unit: Rc<CompiledUnit>) -> EvalResult {
        let _frame = self.stack.enter_root(unit.clone(), self.root.clone());
        self.hoist_declarations(&unit, NodeId::ROOT)?;
        self.exec_body(&unit.program.body).await
    }

    /// Evaluate a unit compiled for `scope` as if its code were written there
    pub async fn run_in_scope(&self, unit: Rc<CompiledUnit>, scope: Rc<Scope>) -> EvalResult {
        self.check_depth()?;
        let _frame = self.stack.enter_root(unit.clone(), scope);
        self.hoist_declarations(&unit, NodeId::ROOT)?;
        self.exec_body(&unit.program.body).await
    }

    /// Guest `eval`: strings run in the innermost activation's scope,
    /// anything else comes back unchanged
    async fn eval_code(&self, code: Value) -> EvalResult {
        let Value::String(source) = code else {
            return Ok(code);
        };
        let scope = self
            .stack
            .current_scope()
            .unwrap_or_else(|_| self.root.clone());
        let unit = compiler::compile_in(&source, &scope.visible_names())
            .map_err(|e| self.throw_error(errors::SYNTAX_ERROR, e.message()))?;
        self.run_in_scope(unit, scope).await
    }

    fn check_depth(&self) -> Result<(), Control> {
        if self.stack.depth() >= self.config.max_call_depth {
            return Err(self.throw_error(errors::RANGE_ERROR, "Maximum call stack size exceeded"));
        }
        Ok(())
    }

    /// Call any callable value
    pub fn call_value<'a>(&'a self, callee: &Value, this: Value, args: Vec<Value>) -> EvalFuture<'a> {
        match callee {
            Value::Function(closure) => self.call_closure(closure.clone(), this, args),
            Value::Native(native) if Rc::ptr_eq(native, &self.eval_function) => {
                let code = args.into_iter().next().unwrap_or_default();
                GrowStack::wrap(Box::pin(self.eval_code(code)))
            }
            Value::Native(native) => {
                let native = native.clone();
                Box::pin(async move { (native.func)(self, &this, &args) })
            }
            other => {
                let err = self.type_error(format!("{} is not a function", other.type_of()));
                Box::pin(async move { Err(err) })
            }
        }
    }

    /// One activation of a guest function: capture, hoist, run, close
    pub fn call_closure(&self, closure: FunctionRef, this: Value, args: Vec<Value>) -> EvalFuture<'_> {
        GrowStack::wrap(Box::pin(async move {
            self.check_depth()?;
            let defining = self
                .links
                .scope_of(closure.id)
                .ok_or_else(|| {
                    EngineError::StackDesync(format!(
                        "{} was never linked to a defining scope",
                        closure.internal_name()
                    ))
                })?;

            let _frame = self.stack.capture(&closure, defining, this, &args)?;
            self.hoist_declarations(&closure.unit, closure.node.id)?;

            match self.exec_body(&closure.node.body).await {
                Ok(_) => Ok(Value::Undefined),
                Err(Control::Return(value)) => Ok(value),
                Err(Control::Break(_)) | Err(Control::Continue(_)) => Err(EngineError::StackDesync(
                    format!("loop control escaped {}", closure.internal_name()),
                )
                .into()),
                Err(other) => Err(other),
            }
        }))
    }

    /* ===================== Properties ===================== */

    /// `target[key]` with primitive and array-method handling
    pub fn get_property(&self, target: &Value, key: &str) -> EvalResult {
        match target {
            Value::Undefined | Value::Null => Err(self.type_error(format!(
                "Cannot read properties of {} (reading '{}')",
                target.to_js_string(),
                key
            ))),
            Value::String(s) => Ok(if key == "length" {
                Value::Number(s.chars().count() as f64)
            } else if let Some(idx) = array_index(key) {
                s.chars()
                    .nth(idx)
                    .map(|c| Value::String(Rc::from(c.to_string())))
                    .unwrap_or_default()
            } else {
                Value::Undefined
            }),
            Value::Object(obj) => Ok(obj
                .get(key)
                .or_else(|| {
                    if obj.is_array() {
                        self.array_methods.get(key)
                    } else {
                        None
                    }
                })
                .unwrap_or_default()),
            Value::Function(f) => Ok(match key {
                "prototype" => Value::Object(f.prototype_object()),
                _ => match f.object.get(key) {
                    Some(v) => v,
                    None => match key {
                        "name" => Value::str(f.name()),
                        "length" => Value::Number(f.node.params.len() as f64),
                        _ => Value::Undefined,
                    },
                },
            }),
            Value::Native(n) => Ok(match n.object.get(key) {
                Some(v) => v,
                None if key == "name" => Value::String(n.name.clone()),
                None => Value::Undefined,
            }),
            Value::Bool(_) | Value::Number(_) | Value::Pending(_) => Ok(Value::Undefined),
        }
    }

    pub fn set_property(&self, target: &Value, key: &str, value: Value) -> Result<(), Control> {
        match target.property_holder() {
            Some(obj) => {
                obj.set(key, value);
                Ok(())
            }
            None if target.is_nullish() => Err(self.type_error(format!(
                "Cannot set properties of {} (setting '{}')",
                target.to_js_string(),
                key
            ))),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("name", &self.name)
            .field("depth", &self.stack.depth())
            .field("links", &self.links.len())
            .finish()
    }
}
