//! # Engine
//!
//! Top-level driver. An [`Engine`] owns one guest global object, one root
//! scope, one call stack and one function/scope association table, and runs
//! one evaluation at a time against them.
//!
//! Evaluation is an async tree walk. While it runs the suspension broker is
//! armed; when the walk touches an unsettled pending value the broker fires,
//! the walk parks at the resolution checkpoint, and the driver awaits the
//! pending value, re-arms the broker and hands the settlement back. The
//! parked walk then continues from the exact point it stopped, so nothing it
//! already did is repeated.
//!
//! ```ignore
//! let engine = Engine::builder().name("demo").build();
//! let value = engine.run("var a = 1; a + 2").await?;
//! assert_eq!(value, Value::from(3));
//! ```

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;

use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::compiler::{self, CompiledUnit, ScopeTreeRecord};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult, GuestFailure};
use crate::executor::errors::{self, ErrorInfo};
use crate::executor::stdlib::inject_stdlib;
use crate::executor::suspension::{StackPosition, Suspension};
use crate::executor::types::{Control, EvalResult, ObjectClass, ObjectRef, Value};
use crate::executor::types::values::{ERROR_MESSAGE_KEY, ERROR_NAME_KEY};
use crate::executor::{Runtime, Scope};

type Evaluation<'a> = Pin<Box<dyn Future<Output = EvalResult> + 'a>>;

/// Where the most recent suspension happened
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuspensionRecord {
    pub pending_id: u64,
    /// Innermost activation first
    pub positions: Vec<StackPosition>,
}

/* ===================== Builder ===================== */

/// Builder for an [`Engine`]
#[derive(Default)]
pub struct EngineBuilder {
    name: Option<String>,
    config: EngineConfig,
    host_global: Option<ObjectRef>,
    defines: Vec<(String, Value)>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Object the guest global object inherits from. Guest reads fall
    /// through to it; guest writes never reach it.
    pub fn host_global(mut self, host: ObjectRef) -> Self {
        self.host_global = Some(host);
        self
    }

    /// Seed a global binding
    pub fn define(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.defines.push((name.into(), value.into()));
        self
    }

    pub fn build(self) -> Engine {
        let name = self
            .name
            .or_else(|| self.config.name.clone())
            .unwrap_or_else(|| format!("engine-{}", Uuid::new_v4()));

        let global = ObjectRef::plain(self.host_global);
        let install_stdlib = self.config.install_stdlib;
        let runtime = Runtime::new(&name, self.config, global);
        if install_stdlib {
            inject_stdlib(&runtime);
        }
        for (key, value) in self.defines {
            runtime.global().set(&key, value);
        }

        tracing::debug!(engine = %name, stdlib = install_stdlib, "Engine created");
        Engine {
            runtime,
            busy: Cell::new(false),
            units: RefCell::new(HashMap::new()),
            last_suspension: RefCell::new(None),
            suspension_count: Cell::new(0),
        }
    }
}

/* ===================== Engine ===================== */

pub struct Engine {
    runtime: Runtime,
    busy: Cell<bool>,
    /// Compiled units by source hash
    units: RefCell<HashMap<String, Rc<CompiledUnit>>>,
    last_suspension: RefCell<Option<SuspensionRecord>>,
    suspension_count: Cell<u64>,
}

/// Clears the busy flag on every exit path of a drive
struct BusyGuard<'a>(&'a Cell<bool>);

impl<'a> BusyGuard<'a> {
    fn enter(flag: &'a Cell<bool>) -> EngineResult<Self> {
        if flag.replace(true) {
            return Err(EngineError::Busy);
        }
        Ok(Self(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Engine with the default configuration and a generated name
    pub fn new() -> Self {
        EngineBuilder::new().build()
    }

    pub fn name(&self) -> &str {
        self.runtime.name()
    }

    /// The guest global object
    pub fn global(&self) -> &ObjectRef {
        self.runtime.global()
    }

    pub fn root_scope(&self) -> &Rc<Scope> {
        self.runtime.root_scope()
    }

    /// Compile `source`, reusing an earlier unit with the same hash
    pub fn compile(&self, source: &str) -> EngineResult<Rc<CompiledUnit>> {
        let hash = compiler::hash_source(source);
        if let Some(unit) = self.units.borrow().get(&hash) {
            return Ok(unit.clone());
        }
        let unit = compiler::compile(source)?;
        self.units.borrow_mut().insert(hash, unit.clone());
        Ok(unit)
    }

    /// Evaluate `source` against this engine's globals. Settles with the
    /// value of the last statement.
    pub async fn run(&self, source: &str) -> EngineResult<Value> {
        let unit = self.compile(source)?;
        self.run_unit(unit).await
    }

    pub async fn run_unit(&self, unit: Rc<CompiledUnit>) -> EngineResult<Value> {
        tracing::debug!(engine = %self.name(), hash = %unit.hash, "Run started");
        let result = self.drive(Box::pin(self.runtime.run_program(unit))).await;
        tracing::debug!(engine = %self.name(), ok = result.is_ok(), "Run finished");
        result
    }

    /// Evaluate `code` inside `scope`, one of this engine's scopes. Settles
    /// with the value of the last statement.
    pub async fn eval_in(&self, scope: &Rc<Scope>, code: &str) -> EngineResult<Value> {
        if !scope.belongs_to(&self.runtime.links) {
            return Err(EngineError::ForeignScope);
        }
        let unit = compiler::compile_in(code, &scope.visible_names())?;
        tracing::debug!(engine = %self.name(), owner = scope.owner(), "Scoped eval started");
        self.drive(Box::pin(self.runtime.run_in_scope(unit, scope.clone())))
            .await
    }

    /// Call a guest or native function from the host
    pub async fn call(&self, function: &Value, this: Value, args: Vec<Value>) -> EngineResult<Value> {
        if !function.is_callable() {
            return Err(EngineError::NotCallable(function.type_of().to_string()));
        }
        self.drive(self.runtime.call_value(function, this, args)).await
    }

    /* ===================== Introspection ===================== */

    /// Scope a guest function was defined in
    pub fn scope_of(&self, function: &Value) -> Option<Rc<Scope>> {
        match function {
            Value::Function(closure) => self.runtime.links.scope_of(closure.id),
            _ => None,
        }
    }

    /// Source text of a guest function's literal
    pub fn function_source(&self, function: &Value) -> Option<String> {
        match function {
            Value::Function(closure) => Some(closure.source_text().to_string()),
            _ => None,
        }
    }

    /// Scope-tree record a guest function was linked to
    pub fn function_record(&self, function: &Value) -> Option<ScopeTreeRecord> {
        match function {
            Value::Function(closure) => {
                let node = self.runtime.links.record_of(closure.id)?;
                closure.unit.record(node).cloned()
            }
            _ => None,
        }
    }

    pub fn last_suspension(&self) -> Option<SuspensionRecord> {
        self.last_suspension.borrow().clone()
    }

    pub fn suspension_count(&self) -> u64 {
        self.suspension_count.get()
    }

    /// Live function/scope associations
    pub fn link_count(&self) -> usize {
        self.runtime.links.len()
    }

    /* ===================== Driver ===================== */

    fn arm(&self, sink: &mpsc::UnboundedSender<Suspension>) {
        let sink = sink.clone();
        self.runtime.broker.arm(Box::new(move |suspension| {
            // The receiver outlives every armed watch of one drive
            let _ = sink.send(suspension);
        }));
    }

    async fn drive(&self, evaluation: Evaluation<'_>) -> EngineResult<Value> {
        let _busy = BusyGuard::enter(&self.busy)?;
        let (sink, mut suspensions) = mpsc::unbounded_channel::<Suspension>();
        self.arm(&sink);

        let mut evaluation = evaluation;
        let outcome = loop {
            tokio::select! {
                biased;
                result = &mut evaluation => break result,
                Some(suspension) = suspensions.recv() => {
                    self.record(&suspension);
                    let settlement = suspension.pending.settled().await;
                    tracing::debug!(
                        engine = %self.name(),
                        pending = suspension.pending.id(),
                        fulfilled = settlement.is_fulfilled(),
                        "Redriving evaluation"
                    );
                    self.arm(&sink);
                    if suspension.resume.send(settlement).is_err() {
                        break Err(EngineError::SuspensionLost.into());
                    }
                }
            }
        };
        drop(evaluation);

        self.runtime.broker.disarm();
        let pruned = self.runtime.links.prune();
        if pruned > 0 {
            tracing::debug!(engine = %self.name(), pruned, "Pruned function links");
        }
        self.settle(outcome)
    }

    fn record(&self, suspension: &Suspension) {
        self.suspension_count.set(self.suspension_count.get() + 1);
        tracing::info!(
            engine = %self.name(),
            pending = suspension.pending.id(),
            positions = ?suspension.positions,
            "Evaluation suspended"
        );
        *self.last_suspension.borrow_mut() = Some(SuspensionRecord {
            pending_id: suspension.pending.id(),
            positions: suspension.positions.clone(),
        });
    }

    fn settle(&self, outcome: EvalResult) -> EngineResult<Value> {
        match outcome {
            Ok(value) => Ok(value),
            Err(Control::Throw(value)) => Err(EngineError::Uncaught(snapshot(&value))),
            Err(Control::Error(err)) => {
                tracing::error!(engine = %self.name(), error = %err, "Evaluation failed");
                Err(err)
            }
            Err(Control::Return(_)) | Err(Control::Break(_)) | Err(Control::Continue(_)) => {
                Err(EngineError::StackDesync(
                    "control transfer escaped the evaluation unit".to_string(),
                ))
            }
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("runtime", &self.runtime)
            .field("busy", &self.busy.get())
            .field("suspensions", &self.suspension_count.get())
            .finish()
    }
}

/// Detach a thrown guest value from the engine heap
fn snapshot(value: &Value) -> GuestFailure {
    let info = match value {
        Value::Object(obj) if obj.class() == ObjectClass::Error => {
            let field = |key: &str| obj.get(key).map(|v| v.to_js_string()).unwrap_or_default();
            ErrorInfo::new(field(ERROR_NAME_KEY), field(ERROR_MESSAGE_KEY))
        }
        other => ErrorInfo::new(errors::UNCAUGHT, other.to_js_string()),
    };
    GuestFailure {
        info,
        value: value.to_json(),
    }
}
