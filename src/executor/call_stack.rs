//! Call stack and the capture / link / close protocol
//!
//! Every activation pushes a [`Frame`] on entry (capture) and pops it on every
//! exit path (close, via [`FrameGuard`]). While the activation runs, each
//! function literal it evaluates is linked to the activation's scope and to
//! the matching child record of the activation's scope-tree record.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use super::scope::Scope;
use super::suspension::StackPosition;
use super::types::{FunctionRef, NodeId, ObjectRef, Span, Value};
use crate::compiler::{CompiledUnit, ScopeTreeRecord, ARGUMENTS_NAME};
use crate::error::EngineError;

/// One live activation
pub struct Frame {
    pub function_name: Rc<str>,
    pub scope: Rc<Scope>,
    pub unit: Rc<CompiledUnit>,
    pub record: NodeId,
    next_child_link_index: Cell<usize>,
    location: Cell<Span>,
}

impl Frame {
    fn new(function_name: &str, scope: Rc<Scope>, unit: Rc<CompiledUnit>, record: NodeId) -> Self {
        Self {
            function_name: Rc::from(function_name),
            scope,
            unit,
            record,
            next_child_link_index: Cell::new(0),
            location: Cell::new(Span::default()),
        }
    }

    pub fn next_child_link_index(&self) -> usize {
        self.next_child_link_index.get()
    }

    pub fn location(&self) -> Span {
        self.location.get()
    }

    fn scope_record(&self) -> Result<&ScopeTreeRecord, EngineError> {
        self.unit
            .record(self.record)
            .ok_or_else(|| EngineError::LinkDesync {
                function: self.function_name.to_string(),
                node: self.record,
                detail: "activation has no scope-tree record".to_string(),
            })
    }
}

/// Pops the frame it guards (and anything above it) when dropped
pub struct FrameGuard<'a> {
    stack: &'a CallStack,
    depth: usize,
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        self.stack.frames.borrow_mut().truncate(self.depth);
    }
}

#[derive(Default)]
pub struct CallStack {
    frames: RefCell<Vec<Rc<Frame>>>,
}

impl CallStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth(&self) -> usize {
        self.frames.borrow().len()
    }

    pub fn top(&self) -> Option<Rc<Frame>> {
        self.frames.borrow().last().cloned()
    }

    fn push(&self, frame: Frame) -> FrameGuard<'_> {
        let mut frames = self.frames.borrow_mut();
        let depth = frames.len();
        frames.push(Rc::new(frame));
        FrameGuard { stack: self, depth }
    }

    /// Scope of the innermost activation
    pub fn current_scope(&self) -> Result<Rc<Scope>, EngineError> {
        self.top()
            .map(|f| f.scope.clone())
            .ok_or_else(|| EngineError::StackDesync("no active frame".to_string()))
    }

    /// Frame for a unit's top level, run against `root` (the engine's root
    /// scope, or any scope for eval code)
    pub fn enter_root(&self, unit: Rc<CompiledUnit>, root: Rc<Scope>) -> FrameGuard<'_> {
        let name = unit
            .record(NodeId::ROOT)
            .map(|r| r.name.clone())
            .unwrap_or_default();
        self.push(Frame::new(&name, root, unit, NodeId::ROOT))
    }

    /// Open an activation of `closure`.
    ///
    /// Functions whose record needs no capture run directly in their defining
    /// scope; everything else gets a fresh scope sealed over the record's
    /// bindings.
    pub fn capture(
        &self,
        closure: &FunctionRef,
        defining: Rc<Scope>,
        this_value: Value,
        args: &[Value],
    ) -> Result<FrameGuard<'_>, EngineError> {
        let record = closure
            .unit
            .record(closure.node.id)
            .ok_or_else(|| EngineError::LinkDesync {
                function: closure.internal_name().to_string(),
                node: closure.node.id,
                detail: "function has no scope-tree record".to_string(),
            })?;

        let scope = if record.requires_capture {
            let bindings = initial_bindings(record, closure, args);
            Scope::create(&defining, &record.name, bindings, this_value)
        } else {
            defining
        };

        Ok(self.push(Frame::new(
            &record.name,
            scope,
            closure.unit.clone(),
            closure.node.id,
        )))
    }

    /// Bind a freshly produced function value to the innermost activation.
    ///
    /// The link index only moves forward. A literal evaluated again (loop
    /// bodies, repeated statements) reuses the record it already consumed;
    /// literals skipped by control flow are passed over.
    pub fn link(&self, closure: &FunctionRef) -> Result<(), EngineError> {
        let frame = self
            .top()
            .ok_or_else(|| EngineError::StackDesync("link outside any activation".to_string()))?;
        let record = frame.scope_record()?;
        let node = closure.node.id;
        let index = frame.next_child_link_index.get();

        if let Some(offset) = record.children[index.min(record.children.len())..]
            .iter()
            .position(|child| *child == node)
        {
            frame.next_child_link_index.set(index + offset + 1);
        } else if !record.children[..index.min(record.children.len())].contains(&node) {
            return Err(EngineError::LinkDesync {
                function: frame.function_name.to_string(),
                node,
                detail: format!(
                    "literal is not among the {} recorded children",
                    record.children.len()
                ),
            });
        }

        frame.scope.link(closure);
        Ok(())
    }

    /// Record the span the innermost activation is evaluating
    pub fn mark(&self, span: Span) {
        if let Some(frame) = self.frames.borrow().last() {
            frame.location.set(span);
        }
    }

    /// Logical positions, innermost first, at most `limit` entries
    pub fn positions(&self, limit: usize) -> Vec<StackPosition> {
        self.frames
            .borrow()
            .iter()
            .rev()
            .take(limit)
            .map(|frame| {
                let loc = frame.location.get();
                StackPosition {
                    function_name: frame.function_name.to_string(),
                    line: loc.start_line + 1,
                    column: loc.start_col + 1,
                }
            })
            .collect()
    }
}

/// Initial values for a record's bindings: parameters from `args`, the
/// `arguments` array, the function's own name, and `undefined` for the rest.
/// Hoisted declarations are filled in after the frame is open.
fn initial_bindings(
    record: &ScopeTreeRecord,
    closure: &FunctionRef,
    args: &[Value],
) -> Vec<(Rc<str>, Value)> {
    record
        .bindings
        .iter()
        .map(|name| {
            let value = if let Some(i) = record.params.iter().rposition(|p| p == name) {
                args.get(i).cloned().unwrap_or_default()
            } else if name == ARGUMENTS_NAME {
                Value::Object(ObjectRef::array(args.to_vec()))
            } else if record.self_binding.as_deref() == Some(name.as_str()) {
                Value::Function(closure.clone())
            } else {
                Value::Undefined
            };
            (Rc::from(name.as_str()), value)
        })
        .collect()
}
