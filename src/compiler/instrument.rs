//! Instrumentation pass
//!
//! Runs once per compiled unit, after parsing:
//! - resolves every identifier against the enclosing function scopes and
//!   rewrites the unresolved ones into reads/writes off the global object
//! - turns top-level `var` declarations into global assignments
//! - computes, per function, the bindings that are actually referenced
//! - records the scope tree (ordered child literals per function)
//! - rejects misplaced `return` / `break` / `continue`

use std::collections::HashSet;
use std::rc::Rc;

use super::{
    CompileError, ScopeTreeRecord, ARGUMENTS_NAME, EVAL_NAME, RESERVED_NAMES, ROOT_FUNCTION_NAME,
};
use crate::executor::types::ast::{
    AssignOp, Expr, ForInit, ForTarget, FunctionNode, MemberProp, NodeId, Span, Stmt, VarDecl,
};

type CResult<T> = Result<T, CompileError>;

/* ===================== Declarations ===================== */

/// Names a function body declares through hoisting
#[derive(Default)]
struct Declarations {
    vars: Vec<String>,
    functions: Vec<String>,
}

impl Declarations {
    fn add_var(&mut self, name: &str) {
        if !self.vars.iter().any(|v| v == name) {
            self.vars.push(name.to_string());
        }
    }
}

/// Collect `var` and function-declaration names of one function body,
/// without descending into nested functions
fn collect_declarations(body: &[Stmt]) -> Declarations {
    let mut decls = Declarations::default();
    for stmt in body {
        collect_stmt(stmt, &mut decls);
    }
    decls
}

fn collect_stmt(stmt: &Stmt, decls: &mut Declarations) {
    match stmt {
        Stmt::Var { decls: vars, .. } => {
            for v in vars {
                decls.add_var(&v.name);
            }
        }
        Stmt::Function { func, .. } => {
            if let Some(name) = &func.name {
                if !decls.functions.contains(name) {
                    decls.functions.push(name.clone());
                }
            }
        }
        Stmt::If { then_s, else_s, .. } => {
            collect_stmt(then_s, decls);
            if let Some(e) = else_s {
                collect_stmt(e, decls);
            }
        }
        Stmt::While { body, .. } | Stmt::DoWhile { body, .. } | Stmt::Labeled { body, .. } => {
            collect_stmt(body, decls)
        }
        Stmt::For { init, body, .. } => {
            if let Some(ForInit::Var { decls: vars }) = init {
                for v in vars {
                    decls.add_var(&v.name);
                }
            }
            collect_stmt(body, decls);
        }
        Stmt::ForIn { target, body, .. } => {
            if let ForTarget::Var { name, .. } = target {
                decls.add_var(name);
            }
            collect_stmt(body, decls);
        }
        Stmt::Try {
            block,
            handler,
            finalizer,
            ..
        } => {
            collect_stmt(block, decls);
            if let Some(h) = handler {
                collect_stmt(&h.body, decls);
            }
            if let Some(f) = finalizer {
                collect_stmt(f, decls);
            }
        }
        Stmt::Block { body, .. } => {
            for s in body {
                collect_stmt(s, decls);
            }
        }
        Stmt::Expr { .. }
        | Stmt::Return { .. }
        | Stmt::Break { .. }
        | Stmt::Continue { .. }
        | Stmt::Throw { .. }
        | Stmt::Empty { .. } => {}
    }
}

/// Does a labeled statement (possibly itself labeled) label a loop?
fn labels_loop(stmt: &Stmt) -> bool {
    match stmt {
        Stmt::Labeled { body, .. } => labels_loop(body),
        other => other.is_loop(),
    }
}

/* ===================== Per-function state ===================== */

struct FunctionCtx {
    id: NodeId,
    is_root: bool,
    /// Declared names in binding order
    declared: Vec<String>,
    self_name: Option<String>,
    referenced: HashSet<String>,
    uses_this: bool,
    hoisted: Vec<NodeId>,
    expr_children: Vec<NodeId>,
    /// Enclosing labels and whether each labels a loop
    labels: Vec<(String, bool)>,
    loop_depth: usize,
    /// Mentions `eval`: every declared name stays bound
    has_eval: bool,
}

impl FunctionCtx {
    /// Root bindings live on the global object; nothing is declared here
    fn root() -> Self {
        Self::empty(NodeId::ROOT, true)
    }

    fn function(node: &FunctionNode, decls: Declarations) -> Self {
        let mut ctx = Self::empty(node.id, false);
        for name in node
            .params
            .iter()
            .chain(decls.functions.iter())
            .chain(decls.vars.iter())
        {
            ctx.declare(name);
        }
        if !node.is_declaration {
            if let Some(name) = &node.name {
                if !ctx.declares(name) {
                    ctx.declare(name);
                    ctx.self_name = Some(name.clone());
                }
            }
        }
        ctx
    }

    fn empty(id: NodeId, is_root: bool) -> Self {
        Self {
            id,
            is_root,
            declared: Vec::new(),
            self_name: None,
            referenced: HashSet::new(),
            uses_this: false,
            hoisted: Vec::new(),
            expr_children: Vec::new(),
            labels: Vec::new(),
            loop_depth: 0,
            has_eval: false,
        }
    }

    fn declares(&self, name: &str) -> bool {
        self.declared.iter().any(|d| d == name)
    }

    fn declare(&mut self, name: &str) {
        if !self.declares(name) {
            self.declared.push(name.to_string());
        }
    }

    fn into_record(self, name: String, params: Vec<String>, span: Span) -> ScopeTreeRecord {
        let bindings: Vec<String> = self
            .declared
            .iter()
            .filter(|d| self.has_eval || self.referenced.contains(*d))
            .cloned()
            .collect();
        let self_binding = self.self_name.filter(|n| bindings.contains(n));
        let mut children = self.hoisted.clone();
        children.extend(self.expr_children.iter().copied());
        let uses_this = self.uses_this || self.has_eval;
        let requires_capture = !bindings.is_empty() || !children.is_empty() || uses_this;

        ScopeTreeRecord {
            node: self.id,
            name,
            params,
            bindings,
            self_binding,
            uses_this,
            requires_capture,
            hoisted: self.hoisted,
            children,
            span,
        }
    }
}

/* ===================== Pass ===================== */

pub(crate) struct Instrumented {
    pub body: Vec<Stmt>,
    pub records: Vec<ScopeTreeRecord>,
    pub functions: Vec<Option<Rc<FunctionNode>>>,
}

/// Instrument a parsed program holding `function_count` ids (root included).
///
/// `outer` names the bindings of the scope chain the program will run in;
/// they resolve as identifiers instead of global properties.
pub(crate) fn instrument(
    body: Vec<Stmt>,
    span: Span,
    function_count: u32,
    outer: &[String],
) -> CResult<Instrumented> {
    let count = function_count as usize;
    let mut pass = Instrumenter {
        stack: Vec::new(),
        records: (0..count).map(|_| None).collect(),
        functions: (0..count).map(|_| None).collect(),
        outer: outer.iter().cloned().collect(),
    };

    pass.stack.push(FunctionCtx::root());
    let body = body
        .into_iter()
        .map(|s| pass.stmt(s))
        .collect::<CResult<Vec<_>>>()?;
    let root = pass.pop()?;
    pass.store(root.into_record(ROOT_FUNCTION_NAME.to_string(), Vec::new(), span));

    let records = pass
        .records
        .into_iter()
        .enumerate()
        .map(|(i, r)| {
            r.ok_or_else(|| {
                CompileError::Invalid(format!("function #{} was never instrumented", i), None)
            })
        })
        .collect::<CResult<Vec<_>>>()?;

    Ok(Instrumented {
        body,
        records,
        functions: pass.functions,
    })
}

struct Instrumenter {
    stack: Vec<FunctionCtx>,
    records: Vec<Option<ScopeTreeRecord>>,
    functions: Vec<Option<Rc<FunctionNode>>>,
    outer: HashSet<String>,
}

impl Instrumenter {
    fn top(&mut self) -> CResult<&mut FunctionCtx> {
        self.stack
            .last_mut()
            .ok_or_else(|| CompileError::Invalid("no enclosing function".to_string(), None))
    }

    fn pop(&mut self) -> CResult<FunctionCtx> {
        self.stack
            .pop()
            .ok_or_else(|| CompileError::Invalid("unbalanced function nesting".to_string(), None))
    }

    fn at_root(&self) -> bool {
        self.stack.last().map(|c| c.is_root).unwrap_or(true)
    }

    fn store(&mut self, record: ScopeTreeRecord) {
        let idx = record.node.index();
        if idx < self.records.len() {
            self.records[idx] = Some(record);
        }
    }

    /// Resolve `name` to an enclosing function binding, marking it referenced
    fn resolve(&mut self, name: &str) -> bool {
        if name == ARGUMENTS_NAME {
            if let Some(ctx) = self.stack.last_mut().filter(|c| !c.is_root) {
                ctx.declare(name);
                ctx.referenced.insert(name.to_string());
                return true;
            }
        }
        for ctx in self.stack.iter_mut().rev() {
            if ctx.is_root {
                break;
            }
            if ctx.declares(name) {
                ctx.referenced.insert(name.to_string());
                return true;
            }
        }
        self.outer.contains(name)
    }

    fn identifier(&mut self, name: String, span: Span) -> Expr {
        if self.resolve(&name) || RESERVED_NAMES.contains(&name.as_str()) {
            return Expr::Ident { name, span };
        }
        if name == EVAL_NAME {
            for ctx in self.stack.iter_mut().filter(|c| !c.is_root) {
                ctx.has_eval = true;
            }
        }
        Expr::global_member(&name, span, true)
    }

    /// Target of a root-level `var`: an outer binding when one exists,
    /// otherwise the global property
    fn root_var_target(&self, name: &str, span: Span) -> Expr {
        if self.outer.contains(name) {
            Expr::Ident {
                name: name.to_string(),
                span,
            }
        } else {
            Expr::global_member(name, span, false)
        }
    }

    /* ---------- functions ---------- */

    fn function(&mut self, func: &mut Rc<FunctionNode>) -> CResult<()> {
        let id = {
            let node = Rc::make_mut(func);
            {
                let parent = self.top()?;
                if node.is_declaration {
                    parent.hoisted.push(node.id);
                } else {
                    parent.expr_children.push(node.id);
                }
            }

            let decls = collect_declarations(&node.body);
            self.stack.push(FunctionCtx::function(node, decls));
            let body = std::mem::take(&mut node.body);
            let rewritten = body
                .into_iter()
                .map(|s| self.stmt(s))
                .collect::<CResult<Vec<_>>>();
            let ctx = self.pop()?;
            node.body = rewritten?;

            let name = node
                .name
                .clone()
                .unwrap_or_else(|| format!("anonymous_{}", node.id.0));
            let record = ctx.into_record(name, node.params.clone(), node.span);
            self.store(record);
            node.id
        };

        if let Some(slot) = self.functions.get_mut(id.index()) {
            *slot = Some(func.clone());
        }
        Ok(())
    }

    /* ---------- statements ---------- */

    fn stmt(&mut self, stmt: Stmt) -> CResult<Stmt> {
        Ok(match stmt {
            Stmt::Expr { expr, span } => Stmt::Expr {
                expr: self.expr(expr)?,
                span,
            },
            Stmt::Var { decls, span } => self.var_stmt(decls, span)?,
            Stmt::Function { mut func, span } => {
                self.function(&mut func)?;
                Stmt::Function { func, span }
            }
            Stmt::Return { arg, span } => {
                if self.at_root() {
                    return Err(CompileError::Invalid(
                        "Illegal return statement outside of a function".to_string(),
                        Some(span),
                    ));
                }
                Stmt::Return {
                    arg: self.opt_expr(arg)?,
                    span,
                }
            }
            Stmt::If {
                test,
                then_s,
                else_s,
                span,
            } => Stmt::If {
                test: self.expr(test)?,
                then_s: Box::new(self.stmt(*then_s)?),
                else_s: match else_s {
                    Some(s) => Some(Box::new(self.stmt(*s)?)),
                    None => None,
                },
                span,
            },
            Stmt::While { test, body, span } => Stmt::While {
                test: self.expr(test)?,
                body: Box::new(self.loop_body(*body)?),
                span,
            },
            Stmt::DoWhile { body, test, span } => Stmt::DoWhile {
                body: Box::new(self.loop_body(*body)?),
                test: self.expr(test)?,
                span,
            },
            Stmt::For {
                init,
                test,
                update,
                body,
                span,
            } => {
                let init = match init {
                    Some(ForInit::Var { decls }) => self.for_var_init(decls, span)?,
                    Some(ForInit::Expr { expr }) => Some(ForInit::Expr {
                        expr: self.expr(expr)?,
                    }),
                    None => None,
                };
                Stmt::For {
                    init,
                    test: self.opt_expr(test)?,
                    update: self.opt_expr(update)?,
                    body: Box::new(self.loop_body(*body)?),
                    span,
                }
            }
            Stmt::ForIn {
                kind,
                target,
                iterable,
                body,
                span,
            } => {
                let target = match target {
                    ForTarget::Var { name, span: ts } => {
                        if self.at_root() {
                            ForTarget::Expr {
                                expr: self.root_var_target(&name, ts),
                            }
                        } else {
                            self.resolve(&name);
                            ForTarget::Var { name, span: ts }
                        }
                    }
                    ForTarget::Expr { expr } => ForTarget::Expr {
                        expr: self.expr(expr)?,
                    },
                };
                Stmt::ForIn {
                    kind,
                    target,
                    iterable: self.expr(iterable)?,
                    body: Box::new(self.loop_body(*body)?),
                    span,
                }
            }
            Stmt::Break { label, span } => {
                let ctx = self.top()?;
                let valid = match &label {
                    None => ctx.loop_depth > 0,
                    Some(l) => ctx.labels.iter().any(|(name, _)| name == l),
                };
                if !valid {
                    return Err(CompileError::Invalid(
                        match &label {
                            None => "Illegal break statement".to_string(),
                            Some(l) => format!("Undefined label '{}'", l),
                        },
                        Some(span),
                    ));
                }
                Stmt::Break { label, span }
            }
            Stmt::Continue { label, span } => {
                let ctx = self.top()?;
                let valid = match &label {
                    None => ctx.loop_depth > 0,
                    Some(l) => ctx
                        .labels
                        .iter()
                        .any(|(name, is_loop)| name == l && *is_loop),
                };
                if !valid {
                    return Err(CompileError::Invalid(
                        match &label {
                            None => {
                                "Illegal continue statement: no surrounding iteration statement"
                                    .to_string()
                            }
                            Some(l) => format!(
                                "Illegal continue statement: '{}' does not denote an iteration statement",
                                l
                            ),
                        },
                        Some(span),
                    ));
                }
                Stmt::Continue { label, span }
            }
            Stmt::Throw { arg, span } => Stmt::Throw {
                arg: self.expr(arg)?,
                span,
            },
            Stmt::Try {
                block,
                handler,
                finalizer,
                span,
            } => {
                let block = Box::new(self.stmt(*block)?);
                let handler = match handler {
                    Some(mut h) => {
                        h.body = Box::new(self.stmt(*h.body)?);
                        Some(h)
                    }
                    None => None,
                };
                let finalizer = match finalizer {
                    Some(f) => Some(Box::new(self.stmt(*f)?)),
                    None => None,
                };
                Stmt::Try {
                    block,
                    handler,
                    finalizer,
                    span,
                }
            }
            Stmt::Labeled { label, body, span } => {
                let is_loop = labels_loop(&body);
                self.top()?.labels.push((label.clone(), is_loop));
                let body = self.stmt(*body);
                self.top()?.labels.pop();
                Stmt::Labeled {
                    label,
                    body: Box::new(body?),
                    span,
                }
            }
            Stmt::Block { body, span } => Stmt::Block {
                body: body
                    .into_iter()
                    .map(|s| self.stmt(s))
                    .collect::<CResult<Vec<_>>>()?,
                span,
            },
            Stmt::Empty { span } => Stmt::Empty { span },
        })
    }

    fn loop_body(&mut self, body: Stmt) -> CResult<Stmt> {
        self.top()?.loop_depth += 1;
        let result = self.stmt(body);
        self.top()?.loop_depth -= 1;
        result
    }

    /// `var` at the root assigns the global object; inside a function it
    /// keeps only the declarations that initialize something.
    fn var_stmt(&mut self, decls: Vec<VarDecl>, span: Span) -> CResult<Stmt> {
        if self.at_root() {
            let mut exprs = self.global_assignments(decls)?;
            return Ok(if exprs.len() == 1 {
                Stmt::Expr {
                    expr: exprs.remove(0),
                    span,
                }
            } else {
                Stmt::Expr {
                    expr: Expr::Sequence { exprs, span },
                    span,
                }
            });
        }

        let decls = self.local_decls(decls)?;
        Ok(if decls.is_empty() {
            Stmt::Empty { span }
        } else {
            Stmt::Var { decls, span }
        })
    }

    fn for_var_init(&mut self, decls: Vec<VarDecl>, span: Span) -> CResult<Option<ForInit>> {
        if self.at_root() {
            let mut exprs = self.global_assignments(decls)?;
            let expr = if exprs.len() == 1 {
                exprs.remove(0)
            } else {
                Expr::Sequence { exprs, span }
            };
            return Ok(Some(ForInit::Expr { expr }));
        }
        let decls = self.local_decls(decls)?;
        Ok(if decls.is_empty() {
            None
        } else {
            Some(ForInit::Var { decls })
        })
    }

    fn global_assignments(&mut self, decls: Vec<VarDecl>) -> CResult<Vec<Expr>> {
        decls
            .into_iter()
            .map(|decl| {
                let value = match decl.init {
                    Some(init) => self.expr(init)?,
                    None => Expr::Ident {
                        name: "undefined".to_string(),
                        span: decl.span,
                    },
                };
                Ok(Expr::Assign {
                    op: AssignOp::Assign,
                    target: Box::new(self.root_var_target(&decl.name, decl.span)),
                    value: Box::new(value),
                    span: decl.span,
                })
            })
            .collect()
    }

    fn local_decls(&mut self, decls: Vec<VarDecl>) -> CResult<Vec<VarDecl>> {
        let mut kept = Vec::new();
        for decl in decls {
            if let Some(init) = decl.init {
                self.resolve(&decl.name);
                kept.push(VarDecl {
                    name: decl.name,
                    init: Some(self.expr(init)?),
                    span: decl.span,
                });
            }
        }
        Ok(kept)
    }

    /* ---------- expressions ---------- */

    fn opt_expr(&mut self, expr: Option<Expr>) -> CResult<Option<Expr>> {
        expr.map(|e| self.expr(e)).transpose()
    }

    fn boxed(&mut self, expr: Box<Expr>) -> CResult<Box<Expr>> {
        Ok(Box::new(self.expr(*expr)?))
    }

    fn exprs(&mut self, exprs: Vec<Expr>) -> CResult<Vec<Expr>> {
        exprs.into_iter().map(|e| self.expr(e)).collect()
    }

    fn expr(&mut self, expr: Expr) -> CResult<Expr> {
        Ok(match expr {
            Expr::Ident { name, span } => self.identifier(name, span),
            Expr::This { span } => {
                self.top()?.uses_this = true;
                Expr::This { span }
            }
            Expr::Function { mut func, span } => {
                self.function(&mut func)?;
                Expr::Function { func, span }
            }
            Expr::LitArray { elements, span } => Expr::LitArray {
                elements: self.exprs(elements)?,
                span,
            },
            Expr::LitObj { properties, span } => Expr::LitObj {
                properties: properties
                    .into_iter()
                    .map(|mut p| {
                        p.value = self.expr(p.value)?;
                        Ok(p)
                    })
                    .collect::<CResult<Vec<_>>>()?,
                span,
            },
            Expr::Member {
                object,
                property,
                implicit,
                span,
            } => Expr::Member {
                object: self.boxed(object)?,
                property: match property {
                    MemberProp::Named { name } => MemberProp::Named { name },
                    MemberProp::Computed { expr } => MemberProp::Computed {
                        expr: self.boxed(expr)?,
                    },
                },
                implicit,
                span,
            },
            Expr::Call { callee, args, span } => Expr::Call {
                callee: self.boxed(callee)?,
                args: self.exprs(args)?,
                span,
            },
            Expr::New { callee, args, span } => Expr::New {
                callee: self.boxed(callee)?,
                args: self.exprs(args)?,
                span,
            },
            Expr::Unary { op, arg, span } => Expr::Unary {
                op,
                arg: self.boxed(arg)?,
                span,
            },
            Expr::Update {
                op,
                prefix,
                target,
                span,
            } => Expr::Update {
                op,
                prefix,
                target: self.boxed(target)?,
                span,
            },
            Expr::Binary {
                op,
                left,
                right,
                span,
            } => Expr::Binary {
                op,
                left: self.boxed(left)?,
                right: self.boxed(right)?,
                span,
            },
            Expr::Logical {
                op,
                left,
                right,
                span,
            } => Expr::Logical {
                op,
                left: self.boxed(left)?,
                right: self.boxed(right)?,
                span,
            },
            Expr::Assign {
                op,
                target,
                value,
                span,
            } => Expr::Assign {
                op,
                target: self.boxed(target)?,
                value: self.boxed(value)?,
                span,
            },
            Expr::Conditional {
                test,
                consequent,
                alternate,
                span,
            } => Expr::Conditional {
                test: self.boxed(test)?,
                consequent: self.boxed(consequent)?,
                alternate: self.boxed(alternate)?,
                span,
            },
            Expr::Sequence { exprs, span } => Expr::Sequence {
                exprs: self.exprs(exprs)?,
                span,
            },
            literal @ (Expr::LitNum { .. }
            | Expr::LitStr { .. }
            | Expr::LitBool { .. }
            | Expr::LitNull { .. }) => literal,
        })
    }
}
