//! Statement execution

use std::rc::Rc;

use super::Runtime;
use crate::error::EngineError;
use crate::executor::types::{
    Control, EvalFuture, EvalResult, ForInit, ForLoopKind, ForTarget, Stmt, Value,
};

/// What a loop does after one body execution
enum LoopStep {
    Next,
    Exit,
}

impl Runtime {
    /// Run a statement list; its value is the last statement's value
    pub(crate) async fn exec_body(&self, body: &[Stmt]) -> EvalResult {
        let mut last = Value::Undefined;
        for stmt in body {
            last = self.exec_stmt(stmt).await?;
        }
        Ok(last)
    }

    pub(crate) fn exec_stmt<'a>(&'a self, stmt: &'a Stmt) -> EvalFuture<'a> {
        self.exec_labeled(stmt, Vec::new())
    }

    /// Execute `stmt` with the labels directly attached to it
    fn exec_labeled<'a>(&'a self, stmt: &'a Stmt, labels: Vec<Rc<str>>) -> EvalFuture<'a> {
        Box::pin(async move {
            self.stack.mark(stmt.span());
            match stmt {
                Stmt::Expr { expr, .. } => self.eval_expr(expr).await,

                Stmt::Var { decls, .. } => {
                    for decl in decls {
                        if let Some(init) = &decl.init {
                            let value = self.eval_expr(init).await?;
                            self.stack
                                .current_scope()?
                                .set(&decl.name, value)
                                .map_err(|e| self.scope_error(e))?;
                        }
                    }
                    Ok(Value::Undefined)
                }

                // Created when the activation was entered
                Stmt::Function { .. } | Stmt::Empty { .. } => Ok(Value::Undefined),

                Stmt::Return { arg, .. } => {
                    let value = match arg {
                        Some(e) => self.eval_expr(e).await?,
                        None => Value::Undefined,
                    };
                    Err(Control::Return(value))
                }

                Stmt::If {
                    test,
                    then_s,
                    else_s,
                    ..
                } => {
                    if self.eval_expr(test).await?.to_boolean() {
                        self.exec_stmt(then_s).await
                    } else if let Some(else_s) = else_s {
                        self.exec_stmt(else_s).await
                    } else {
                        Ok(Value::Undefined)
                    }
                }

                Stmt::While { test, body, .. } => {
                    let mut last = Value::Undefined;
                    while self.eval_expr(test).await?.to_boolean() {
                        let result = self.exec_stmt(body).await;
                        if let LoopStep::Exit = loop_step(result, &labels, &mut last)? {
                            break;
                        }
                    }
                    Ok(last)
                }

                Stmt::DoWhile { body, test, .. } => {
                    let mut last = Value::Undefined;
                    loop {
                        let result = self.exec_stmt(body).await;
                        if let LoopStep::Exit = loop_step(result, &labels, &mut last)? {
                            break;
                        }
                        if !self.eval_expr(test).await?.to_boolean() {
                            break;
                        }
                    }
                    Ok(last)
                }

                Stmt::For {
                    init,
                    test,
                    update,
                    body,
                    ..
                } => {
                    match init {
                        Some(ForInit::Var { decls }) => {
                            for decl in decls {
                                if let Some(e) = &decl.init {
                                    let value = self.eval_expr(e).await?;
                                    self.stack
                                        .current_scope()?
                                        .set(&decl.name, value)
                                        .map_err(|e| self.scope_error(e))?;
                                }
                            }
                        }
                        Some(ForInit::Expr { expr }) => {
                            self.eval_expr(expr).await?;
                        }
                        None => {}
                    }

                    let mut last = Value::Undefined;
                    loop {
                        if let Some(test) = test {
                            if !self.eval_expr(test).await?.to_boolean() {
                                break;
                            }
                        }
                        let result = self.exec_stmt(body).await;
                        if let LoopStep::Exit = loop_step(result, &labels, &mut last)? {
                            break;
                        }
                        // Runs after an own `continue` as well
                        if let Some(update) = update {
                            self.eval_expr(update).await?;
                        }
                    }
                    Ok(last)
                }

                Stmt::ForIn {
                    kind,
                    target,
                    iterable,
                    body,
                    ..
                } => {
                    let source = self.eval_expr(iterable).await?;
                    let items = self.iteration_items(*kind, &source)?;

                    let mut last = Value::Undefined;
                    for item in items {
                        self.assign_loop_target(target, item).await?;
                        let result = self.exec_stmt(body).await;
                        if let LoopStep::Exit = loop_step(result, &labels, &mut last)? {
                            break;
                        }
                    }
                    Ok(last)
                }

                Stmt::Break { label, .. } => {
                    Err(Control::Break(label.as_deref().map(Rc::from)))
                }

                Stmt::Continue { label, .. } => {
                    Err(Control::Continue(label.as_deref().map(Rc::from)))
                }

                Stmt::Throw { arg, .. } => {
                    let value = self.eval_expr(arg).await?;
                    Err(Control::Throw(value))
                }

                Stmt::Try { span, .. } => {
                    tracing::error!(
                        engine = %self.name(),
                        line = span.start_line + 1,
                        "try statement reached the evaluator"
                    );
                    Err(EngineError::Unsupported(format!(
                        "try statement at line {}",
                        span.start_line + 1
                    ))
                    .into())
                }

                Stmt::Labeled { label, body, .. } => {
                    let label: Rc<str> = Rc::from(label.as_str());
                    let result = if body.is_loop() || matches!(body.as_ref(), Stmt::Labeled { .. }) {
                        let mut labels = labels;
                        labels.push(label.clone());
                        self.exec_labeled(body, labels).await
                    } else {
                        self.exec_stmt(body).await
                    };
                    match result {
                        Err(Control::Break(Some(l))) if l == label => Ok(Value::Undefined),
                        other => other,
                    }
                }

                Stmt::Block { body, .. } => self.exec_body(body).await,
            }
        })
    }

    /// Keys (`for-in`) or values (`for-of`) captured once at loop entry
    fn iteration_items(&self, kind: ForLoopKind, source: &Value) -> Result<Vec<Value>, Control> {
        let keys = |keys: Vec<Rc<str>>| -> Vec<Value> { keys.into_iter().map(Value::String).collect() };
        match kind {
            ForLoopKind::In => Ok(match source {
                Value::String(s) => (0..s.chars().count())
                    .map(|i| Value::String(Rc::from(i.to_string())))
                    .collect(),
                other => match other.property_holder() {
                    Some(obj) => keys(obj.enumerable_keys()),
                    None => Vec::new(),
                },
            }),
            ForLoopKind::Of => match source {
                Value::String(s) => Ok(s
                    .chars()
                    .map(|c| Value::String(Rc::from(c.to_string())))
                    .collect()),
                Value::Object(obj) if obj.is_array() => Ok(obj.elements()),
                Value::Object(obj) => Ok(obj.own_entries().into_iter().map(|(_, v)| v).collect()),
                other => Err(self.type_error(format!("{} is not iterable", other.to_js_string()))),
            },
        }
    }

    async fn assign_loop_target(&self, target: &ForTarget, value: Value) -> Result<(), Control> {
        match target {
            ForTarget::Var { name, .. } => self
                .stack
                .current_scope()?
                .set(name, value)
                .map_err(|e| self.scope_error(e)),
            ForTarget::Expr { expr } => {
                let reference = self.eval_reference(expr).await?;
                self.write_reference(&reference, value)
            }
        }
    }
}

/// Absorb this loop's own `break`/`continue`; everything else propagates
fn loop_step(result: EvalResult, labels: &[Rc<str>], last: &mut Value) -> Result<LoopStep, Control> {
    match result {
        Ok(value) => {
            *last = value;
            Ok(LoopStep::Next)
        }
        Err(Control::Break(None)) => Ok(LoopStep::Exit),
        Err(Control::Break(Some(l))) if labels.contains(&l) => Ok(LoopStep::Exit),
        Err(Control::Continue(None)) => Ok(LoopStep::Next),
        Err(Control::Continue(Some(l))) if labels.contains(&l) => Ok(LoopStep::Next),
        Err(other) => Err(other),
    }
}
