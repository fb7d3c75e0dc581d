//! Expression evaluation

use std::rc::Rc;

use super::operators;
use super::Runtime;
use crate::executor::types::{
    AssignOp, Control, EvalFuture, EvalResult, Expr, LogicalOp, MemberProp, ObjectRef, UnaryOp,
    UpdateOp, Value,
};

/// A place an assignment can write to
pub(super) enum Reference {
    Binding(Rc<str>),
    Property {
        object: Value,
        key: Rc<str>,
        /// Rewritten identifier: reading a missing key is a ReferenceError
        implicit: bool,
    },
}

impl Runtime {
    /// Evaluate `expr`; the result has passed the resolution checkpoint
    pub(crate) fn eval_expr<'a>(&'a self, expr: &'a Expr) -> EvalFuture<'a> {
        Box::pin(async move {
            self.stack.mark(expr.span());
            let value = self.eval_node(expr).await?;
            self.resolve(value).await
        })
    }

    async fn eval_node(&self, expr: &Expr) -> EvalResult {
        match expr {
            Expr::LitNum { v, .. } => Ok(Value::Number(*v)),
            Expr::LitStr { v, .. } => Ok(Value::str(v)),
            Expr::LitBool { v, .. } => Ok(Value::Bool(*v)),
            Expr::LitNull { .. } => Ok(Value::Null),

            Expr::LitArray { elements, .. } => {
                let values = self.eval_list(elements).await?;
                Ok(Value::Object(ObjectRef::array(values)))
            }

            Expr::LitObj { properties, .. } => {
                let obj = ObjectRef::plain(None);
                for prop in properties {
                    let value = self.eval_expr(&prop.value).await?;
                    obj.set(&prop.key, value);
                }
                Ok(Value::Object(obj))
            }

            Expr::Ident { name, .. } => {
                let scope = self.stack.current_scope()?;
                scope.get(name).map_err(|e| self.scope_error(e))
            }

            Expr::This { .. } => Ok(self.stack.current_scope()?.this_value()),

            Expr::Function { func, .. } => {
                let unit = self
                    .stack
                    .top()
                    .map(|frame| frame.unit.clone())
                    .ok_or_else(|| {
                        crate::error::EngineError::StackDesync(
                            "function literal outside any activation".to_string(),
                        )
                    })?;
                let closure = self.instantiate(&unit, func.id)?;
                Ok(Value::Function(closure))
            }

            Expr::Member {
                object,
                property,
                implicit,
                ..
            } => {
                let target = self.eval_expr(object).await?;
                let key = self.property_key(property).await?;
                self.read_member(&target, &key, *implicit)
            }

            Expr::Call { callee, args, .. } => self.eval_call(callee, args).await,

            Expr::New { callee, args, .. } => self.eval_new(callee, args).await,

            Expr::Unary { op, arg, .. } => self.eval_unary(*op, arg).await,

            Expr::Update {
                op, prefix, target, ..
            } => {
                let reference = self.eval_reference(target).await?;
                let old = self.read_reference(&reference).await?.to_number();
                let new = match op {
                    UpdateOp::Inc => old + 1.0,
                    UpdateOp::Dec => old - 1.0,
                };
                self.write_reference(&reference, Value::Number(new))?;
                Ok(Value::Number(if *prefix { new } else { old }))
            }

            Expr::Binary {
                op, left, right, ..
            } => {
                let l = self.eval_expr(left).await?;
                let r = self.eval_expr(right).await?;
                operators::binary(self, *op, &l, &r)
            }

            Expr::Logical {
                op, left, right, ..
            } => {
                let l = self.eval_expr(left).await?;
                if short_circuits(*op, &l) {
                    return Ok(l);
                }
                self.eval_expr(right).await
            }

            Expr::Assign {
                op, target, value, ..
            } => self.eval_assign(op, target, value).await,

            Expr::Conditional {
                test,
                consequent,
                alternate,
                ..
            } => {
                if self.eval_expr(test).await?.to_boolean() {
                    self.eval_expr(consequent).await
                } else {
                    self.eval_expr(alternate).await
                }
            }

            Expr::Sequence { exprs, .. } => {
                let mut last = Value::Undefined;
                for e in exprs {
                    last = self.eval_expr(e).await?;
                }
                Ok(last)
            }
        }
    }

    /// Left-to-right evaluation of a node list
    pub(super) async fn eval_list(&self, exprs: &[Expr]) -> Result<Vec<Value>, Control> {
        let mut values = Vec::with_capacity(exprs.len());
        for e in exprs {
            values.push(self.eval_expr(e).await?);
        }
        Ok(values)
    }

    async fn property_key(&self, property: &MemberProp) -> Result<Rc<str>, Control> {
        match property {
            MemberProp::Named { name } => Ok(Rc::from(name.as_str())),
            MemberProp::Computed { expr } => Ok(self.eval_expr(expr).await?.to_property_key()),
        }
    }

    fn read_member(&self, target: &Value, key: &str, implicit: bool) -> EvalResult {
        if implicit {
            if let Some(holder) = target.property_holder() {
                if !holder.has(key) {
                    return Err(self.scope_error(crate::executor::scope::ScopeError::Unbound(
                        key.to_string(),
                    )));
                }
            }
        }
        self.get_property(target, key)
    }

    /* ===================== References ===================== */

    pub(super) async fn eval_reference(&self, target: &Expr) -> Result<Reference, Control> {
        match target {
            Expr::Ident { name, .. } => Ok(Reference::Binding(Rc::from(name.as_str()))),
            Expr::Member {
                object,
                property,
                implicit,
                ..
            } => {
                let object = self.eval_expr(object).await?;
                let key = self.property_key(property).await?;
                Ok(Reference::Property {
                    object,
                    key,
                    implicit: *implicit,
                })
            }
            _ => Err(self.throw_error(
                crate::executor::errors::SYNTAX_ERROR,
                "Invalid left-hand side in assignment",
            )),
        }
    }

    async fn read_reference(&self, reference: &Reference) -> EvalResult {
        let value = match reference {
            Reference::Binding(name) => self
                .stack
                .current_scope()?
                .get(name)
                .map_err(|e| self.scope_error(e))?,
            Reference::Property {
                object,
                key,
                implicit,
            } => self.read_member(object, key, *implicit)?,
        };
        self.resolve(value).await
    }

    pub(super) fn write_reference(&self, reference: &Reference, value: Value) -> Result<(), Control> {
        match reference {
            Reference::Binding(name) => self
                .stack
                .current_scope()?
                .set(name, value)
                .map_err(|e| self.scope_error(e)),
            Reference::Property { object, key, .. } => self.set_property(object, key, value),
        }
    }

    async fn eval_assign(&self, op: &AssignOp, target: &Expr, value: &Expr) -> EvalResult {
        let reference = self.eval_reference(target).await?;
        let result = match op {
            AssignOp::Assign => self.eval_expr(value).await?,
            AssignOp::Compound(bop) => {
                let old = self.read_reference(&reference).await?;
                let rhs = self.eval_expr(value).await?;
                operators::binary(self, *bop, &old, &rhs)?
            }
            AssignOp::Logical(lop) => {
                let old = self.read_reference(&reference).await?;
                if short_circuits(*lop, &old) {
                    return Ok(old);
                }
                self.eval_expr(value).await?
            }
        };
        self.write_reference(&reference, result.clone())?;
        Ok(result)
    }

    /* ===================== Calls ===================== */

    async fn eval_call(&self, callee: &Expr, args: &[Expr]) -> EvalResult {
        let (func, this) = match callee {
            Expr::Member {
                object,
                property,
                implicit,
                ..
            } => {
                let receiver = self.eval_expr(object).await?;
                let key = self.property_key(property).await?;
                let func = self.resolve(self.read_member(&receiver, &key, *implicit)?).await?;
                // Rewritten globals call with the global object as receiver
                (func, receiver)
            }
            other => (self.eval_expr(other).await?, Value::Undefined),
        };

        let args = self.eval_list(args).await?;
        if !func.is_callable() {
            return Err(self.type_error(format!("{} is not a function", func.type_of())));
        }
        self.call_value(&func, this, args).await
    }

    async fn eval_new(&self, callee: &Expr, args: &[Expr]) -> EvalResult {
        let args = self.eval_list(args).await?;
        let ctor = self.eval_expr(callee).await?;
        match &ctor {
            Value::Function(closure) => {
                let instance = ObjectRef::plain(Some(closure.prototype_object()));
                let result = self
                    .call_closure(closure.clone(), Value::Object(instance.clone()), args)
                    .await?;
                Ok(if result.is_object_like() {
                    result
                } else {
                    Value::Object(instance)
                })
            }
            Value::Native(native) if native.constructible => {
                (native.func)(self, &Value::Undefined, &args)
            }
            other => Err(self.type_error(format!("{} is not a constructor", describe(other)))),
        }
    }

    /* ===================== Unary ===================== */

    async fn eval_unary(&self, op: UnaryOp, arg: &Expr) -> EvalResult {
        match op {
            UnaryOp::TypeOf => {
                if let Expr::Member {
                    object,
                    property,
                    implicit: true,
                    ..
                } = arg
                {
                    let target = self.eval_expr(object).await?;
                    let key = self.property_key(property).await?;
                    if let Some(holder) = target.property_holder() {
                        if !holder.has(&key) {
                            return Ok(Value::str("undefined"));
                        }
                    }
                }
                let value = self.eval_expr(arg).await?;
                Ok(Value::str(value.type_of()))
            }
            UnaryOp::Delete => match arg {
                Expr::Member { .. } => {
                    let Reference::Property { object, key, .. } = self.eval_reference(arg).await?
                    else {
                        return Ok(Value::Bool(false));
                    };
                    match object.property_holder() {
                        Some(holder) => Ok(Value::Bool(holder.delete(&key))),
                        None if object.is_nullish() => Err(self.type_error(format!(
                            "Cannot convert {} to object",
                            object.to_js_string()
                        ))),
                        None => Ok(Value::Bool(true)),
                    }
                }
                Expr::Ident { .. } => Ok(Value::Bool(false)),
                other => {
                    self.eval_expr(other).await?;
                    Ok(Value::Bool(true))
                }
            },
            UnaryOp::Void => {
                self.eval_expr(arg).await?;
                Ok(Value::Undefined)
            }
            op => {
                let value = self.eval_expr(arg).await?;
                Ok(operators::unary(op, &value))
            }
        }
    }
}

fn short_circuits(op: LogicalOp, left: &Value) -> bool {
    match op {
        LogicalOp::And => !left.to_boolean(),
        LogicalOp::Or => left.to_boolean(),
        LogicalOp::Nullish => !left.is_nullish(),
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::String(s) => format!("\"{}\"", s),
        Value::Object(_) => "object".to_string(),
        other => other.to_js_string(),
    }
}
