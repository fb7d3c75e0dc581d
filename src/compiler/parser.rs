//! PEST-based parser for the guest language
//!
//! Produces the raw AST with span information. Function literals receive
//! their [`NodeId`] here, in source pre-order, so the ids line up with the
//! scope tree built by the instrumentation pass.

use std::rc::Rc;

use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;

use super::{CompileError, Program};
use crate::executor::types::ast::{
    AssignOp, BinaryOp, CatchClause, Expr, ForInit, ForLoopKind, ForTarget, FunctionNode,
    LogicalOp, MemberProp, NodeId, PropDef, Span, Stmt, UnaryOp, UpdateOp, VarDecl,
};

/* ===================== PEST Parser ===================== */

#[derive(Parser)]
#[grammar = "compiler/grammar.pest"]
struct GuestParser;

impl From<pest::error::Error<Rule>> for CompileError {
    fn from(err: pest::error::Error<Rule>) -> Self {
        let span = match err.line_col {
            pest::error::LineColLocation::Pos((line, col)) => Some(Span {
                start: 0,
                end: 0,
                start_line: line.saturating_sub(1),
                start_col: col.saturating_sub(1),
                end_line: line.saturating_sub(1),
                end_col: col,
            }),
            pest::error::LineColLocation::Span((start_line, start_col), (end_line, end_col)) => {
                Some(Span {
                    start: 0,
                    end: 0,
                    start_line: start_line.saturating_sub(1),
                    start_col: start_col.saturating_sub(1),
                    end_line: end_line.saturating_sub(1),
                    end_col: end_col.saturating_sub(1),
                })
            }
        };
        CompileError::Syntax(err.to_string(), span)
    }
}

type ParseResult<T> = Result<T, CompileError>;

/* ===================== Span Helpers ===================== */

/// Convert a PEST pair's span to our Span type
fn pair_to_span(pair: &Pair<Rule>, source: &str) -> Span {
    let pest_span = pair.as_span();
    let start = pest_span.start();
    let end = pest_span.end();

    let (start_line, start_col) = offset_to_line_col(source, start);
    let (end_line, end_col) = offset_to_line_col(source, end);

    Span::new(start, end, start_line, start_col, end_line, end_col)
}

/// Convert byte offset to (line, column) - 0-indexed
fn offset_to_line_col(source: &str, offset: usize) -> (usize, usize) {
    let mut line = 0;
    let mut col = 0;
    let mut current_offset = 0;

    for ch in source.chars() {
        if current_offset >= offset {
            break;
        }
        if ch == '\n' {
            line += 1;
            col = 0;
        } else {
            col += 1;
        }
        current_offset += ch.len_utf8();
    }

    (line, col)
}

/* ===================== Pair Helpers ===================== */

/// Keywords that only mark structure and carry no value for the builder
fn is_structural_keyword(rule: Rule) -> bool {
    matches!(
        rule,
        Rule::kw_var
            | Rule::kw_function
            | Rule::kw_if
            | Rule::kw_else
            | Rule::kw_while
            | Rule::kw_do
            | Rule::kw_for
            | Rule::kw_return
            | Rule::kw_break
            | Rule::kw_continue
            | Rule::kw_throw
            | Rule::kw_try
            | Rule::kw_catch
            | Rule::kw_finally
            | Rule::kw_new
    )
}

fn children(pair: Pair<Rule>) -> std::vec::IntoIter<Pair<Rule>> {
    pair.into_inner()
        .filter(|p| !is_structural_keyword(p.as_rule()))
        .collect::<Vec<_>>()
        .into_iter()
}

fn expect_pair<'i>(
    pairs: &mut impl Iterator<Item = Pair<'i, Rule>>,
    what: &str,
    span: Span,
) -> ParseResult<Pair<'i, Rule>> {
    pairs
        .next()
        .ok_or_else(|| CompileError::Build(format!("Expected {}", what), Some(span)))
}

/* ===================== Public API ===================== */

/// Parse guest source into a raw (uninstrumented) program
pub fn parse_program(source: &str) -> ParseResult<Program> {
    let mut pairs = GuestParser::parse(Rule::program, source)?;
    let program = pairs
        .next()
        .ok_or_else(|| CompileError::Build("Empty parse result".to_string(), None))?;
    let span = pair_to_span(&program, source);

    let mut builder = AstBuilder::new(source);
    let mut body = Vec::new();
    for pair in program.into_inner() {
        match pair.as_rule() {
            Rule::statement => body.push(builder.build_statement(pair)?),
            Rule::EOI => {}
            other => {
                return Err(CompileError::Build(
                    format!("Unexpected program content: {:?}", other),
                    Some(span),
                ))
            }
        }
    }

    Ok(Program {
        body,
        span,
        function_count: builder.next_node,
    })
}

/* ===================== AST Builder ===================== */

struct AstBuilder<'s> {
    source: &'s str,
    /// Next function id; 0 is the program itself
    next_node: u32,
}

impl<'s> AstBuilder<'s> {
    fn new(source: &'s str) -> Self {
        Self {
            source,
            next_node: 1,
        }
    }

    fn span(&self, pair: &Pair<Rule>) -> Span {
        pair_to_span(pair, self.source)
    }

    fn alloc_node(&mut self) -> NodeId {
        let id = NodeId(self.next_node);
        self.next_node += 1;
        id
    }

    /* ---------- statements ---------- */

    fn build_statement(&mut self, pair: Pair<Rule>) -> ParseResult<Stmt> {
        let span = self.span(&pair);

        match pair.as_rule() {
            Rule::statement => {
                let mut inner = pair.into_inner();
                let stmt = expect_pair(&mut inner, "statement", span)?;
                self.build_statement(stmt)
            }
            Rule::block => self.build_block(pair),
            Rule::var_stmt => {
                let decls = self.build_var_decls(children(pair))?;
                Ok(Stmt::Var { decls, span })
            }
            Rule::let_stmt => Err(CompileError::Build(
                "Block-scoped declarations (let/const) are not supported; use var".to_string(),
                Some(span),
            )),
            Rule::function_decl => {
                let func = self.build_function(pair, true)?;
                Ok(Stmt::Function { func, span })
            }
            Rule::if_stmt => self.build_if_stmt(pair),
            Rule::while_stmt => {
                let mut inner = children(pair);
                let test = self.build_expression(expect_pair(&mut inner, "condition", span)?)?;
                let body = self.build_statement(expect_pair(&mut inner, "loop body", span)?)?;
                Ok(Stmt::While {
                    test,
                    body: Box::new(body),
                    span,
                })
            }
            Rule::do_while_stmt => {
                let mut inner = children(pair);
                let body = self.build_statement(expect_pair(&mut inner, "loop body", span)?)?;
                let test = self.build_expression(expect_pair(&mut inner, "condition", span)?)?;
                Ok(Stmt::DoWhile {
                    body: Box::new(body),
                    test,
                    span,
                })
            }
            Rule::for_stmt => self.build_for_stmt(pair),
            Rule::for_in_stmt => self.build_for_in_stmt(pair),
            Rule::return_stmt => {
                let arg = match children(pair).next() {
                    Some(expr) => Some(self.build_expression(expr)?),
                    None => None,
                };
                Ok(Stmt::Return { arg, span })
            }
            Rule::break_stmt | Rule::continue_stmt => {
                let is_break = pair.as_rule() == Rule::break_stmt;
                let mut inner = pair.into_inner();
                let body = expect_pair(&mut inner, "jump statement", span)?;
                let label = children(body).next().map(|id| id.as_str().to_string());
                if is_break {
                    Ok(Stmt::Break { label, span })
                } else {
                    Ok(Stmt::Continue { label, span })
                }
            }
            Rule::throw_stmt => {
                let mut inner = children(pair);
                let arg = self.build_expression(expect_pair(&mut inner, "thrown value", span)?)?;
                Ok(Stmt::Throw { arg, span })
            }
            Rule::try_stmt => self.build_try_stmt(pair),
            Rule::labeled_stmt => {
                let mut inner = children(pair);
                let label = expect_pair(&mut inner, "label", span)?.as_str().to_string();
                let body = self.build_statement(expect_pair(&mut inner, "labeled body", span)?)?;
                Ok(Stmt::Labeled {
                    label,
                    body: Box::new(body),
                    span,
                })
            }
            Rule::empty_stmt => Ok(Stmt::Empty { span }),
            Rule::expr_stmt => {
                let mut inner = children(pair);
                let expr = self.build_expression(expect_pair(&mut inner, "expression", span)?)?;
                Ok(Stmt::Expr { expr, span })
            }
            other => Err(CompileError::Build(
                format!("Unexpected statement rule: {:?}", other),
                Some(span),
            )),
        }
    }

    fn build_block(&mut self, pair: Pair<Rule>) -> ParseResult<Stmt> {
        let span = self.span(&pair);
        let body = pair
            .into_inner()
            .map(|stmt| self.build_statement(stmt))
            .collect::<ParseResult<Vec<_>>>()?;
        Ok(Stmt::Block { body, span })
    }

    fn build_var_decls<'i>(
        &mut self,
        pairs: impl Iterator<Item = Pair<'i, Rule>>,
    ) -> ParseResult<Vec<VarDecl>> {
        let mut decls = Vec::new();
        for decl in pairs {
            let span = self.span(&decl);
            let mut inner = decl.into_inner();
            let name = expect_pair(&mut inner, "variable name", span)?
                .as_str()
                .to_string();
            let init = match inner.next() {
                Some(expr) => Some(self.build_expression(expr)?),
                None => None,
            };
            decls.push(VarDecl { name, init, span });
        }
        Ok(decls)
    }

    fn build_if_stmt(&mut self, pair: Pair<Rule>) -> ParseResult<Stmt> {
        let span = self.span(&pair);
        let mut inner = children(pair);

        let test = self.build_expression(expect_pair(&mut inner, "condition", span)?)?;
        let then_s = self.build_statement(expect_pair(&mut inner, "then branch", span)?)?;

        let else_s = match inner.next() {
            Some(else_clause) => {
                let mut else_inner = children(else_clause);
                let stmt = expect_pair(&mut else_inner, "else branch", span)?;
                Some(Box::new(self.build_statement(stmt)?))
            }
            None => None,
        };

        Ok(Stmt::If {
            test,
            then_s: Box::new(then_s),
            else_s,
            span,
        })
    }

    fn build_for_stmt(&mut self, pair: Pair<Rule>) -> ParseResult<Stmt> {
        let span = self.span(&pair);
        let mut init = None;
        let mut test = None;
        let mut update = None;
        let mut body = None;

        for part in children(pair) {
            match part.as_rule() {
                Rule::for_init => {
                    let mut inner = part.into_inner();
                    let clause = expect_pair(&mut inner, "for initializer", span)?;
                    init = Some(match clause.as_rule() {
                        Rule::for_var => ForInit::Var {
                            decls: self.build_var_decls(children(clause))?,
                        },
                        _ => ForInit::Expr {
                            expr: self.build_expression(clause)?,
                        },
                    });
                }
                Rule::for_test => {
                    let mut inner = part.into_inner();
                    test = Some(self.build_expression(expect_pair(&mut inner, "for test", span)?)?);
                }
                Rule::for_update => {
                    let mut inner = part.into_inner();
                    update =
                        Some(self.build_expression(expect_pair(&mut inner, "for update", span)?)?);
                }
                _ => body = Some(self.build_statement(part)?),
            }
        }

        let body = body
            .ok_or_else(|| CompileError::Build("Missing for-loop body".to_string(), Some(span)))?;
        Ok(Stmt::For {
            init,
            test,
            update,
            body: Box::new(body),
            span,
        })
    }

    fn build_for_in_stmt(&mut self, pair: Pair<Rule>) -> ParseResult<Stmt> {
        let span = self.span(&pair);
        let mut inner = children(pair);

        let target_pair = expect_pair(&mut inner, "loop target", span)?;
        let target_span = self.span(&target_pair);
        let mut target_inner = children(target_pair);
        let first = expect_pair(&mut target_inner, "loop target", target_span)?;
        let target = match first.as_rule() {
            Rule::identifier => ForTarget::Var {
                name: first.as_str().to_string(),
                span: target_span,
            },
            _ => {
                let expr = self.build_expression(first)?;
                if !expr.is_assignable() {
                    return Err(CompileError::Build(
                        "Invalid left-hand side in for-in/for-of".to_string(),
                        Some(target_span),
                    ));
                }
                ForTarget::Expr { expr }
            }
        };

        let kind = match expect_pair(&mut inner, "'in' or 'of'", span)?.as_rule() {
            Rule::kw_of => ForLoopKind::Of,
            _ => ForLoopKind::In,
        };
        let iterable = self.build_expression(expect_pair(&mut inner, "iterable", span)?)?;
        let body = self.build_statement(expect_pair(&mut inner, "loop body", span)?)?;

        Ok(Stmt::ForIn {
            kind,
            target,
            iterable,
            body: Box::new(body),
            span,
        })
    }

    fn build_try_stmt(&mut self, pair: Pair<Rule>) -> ParseResult<Stmt> {
        let span = self.span(&pair);
        let mut inner = children(pair);
        let block = self.build_block(expect_pair(&mut inner, "try block", span)?)?;

        let mut handler = None;
        let mut finalizer = None;
        for clause in inner {
            match clause.as_rule() {
                Rule::catch_clause => {
                    let mut param = None;
                    let mut body = None;
                    for part in children(clause) {
                        match part.as_rule() {
                            Rule::identifier => param = Some(part.as_str().to_string()),
                            _ => body = Some(self.build_block(part)?),
                        }
                    }
                    let body = body.ok_or_else(|| {
                        CompileError::Build("Missing catch block".to_string(), Some(span))
                    })?;
                    handler = Some(CatchClause {
                        param,
                        body: Box::new(body),
                    });
                }
                _ => {
                    let mut fin = children(clause);
                    let block = expect_pair(&mut fin, "finally block", span)?;
                    finalizer = Some(Box::new(self.build_block(block)?));
                }
            }
        }

        Ok(Stmt::Try {
            block: Box::new(block),
            handler,
            finalizer,
            span,
        })
    }

    /* ---------- functions ---------- */

    fn build_function(
        &mut self,
        pair: Pair<Rule>,
        is_declaration: bool,
    ) -> ParseResult<Rc<FunctionNode>> {
        let span = self.span(&pair);
        let id = self.alloc_node();
        let mut name = None;
        let mut params = Vec::new();
        let mut body = Vec::new();

        for part in children(pair) {
            match part.as_rule() {
                Rule::identifier => name = Some(part.as_str().to_string()),
                Rule::params => {
                    params = part.into_inner().map(|p| p.as_str().to_string()).collect();
                }
                Rule::function_body => {
                    body = part
                        .into_inner()
                        .map(|stmt| self.build_statement(stmt))
                        .collect::<ParseResult<Vec<_>>>()?;
                }
                other => {
                    return Err(CompileError::Build(
                        format!("Unexpected function part: {:?}", other),
                        Some(span),
                    ))
                }
            }
        }

        Ok(Rc::new(FunctionNode {
            id,
            name,
            params,
            body,
            is_declaration,
            span,
        }))
    }

    /* ---------- expressions ---------- */

    fn build_expression(&mut self, pair: Pair<Rule>) -> ParseResult<Expr> {
        let span = self.span(&pair);

        match pair.as_rule() {
            Rule::expression => {
                let mut exprs = pair
                    .into_inner()
                    .map(|p| self.build_expression(p))
                    .collect::<ParseResult<Vec<_>>>()?;
                if exprs.len() == 1 {
                    Ok(exprs.remove(0))
                } else {
                    Ok(Expr::Sequence { exprs, span })
                }
            }
            Rule::assignment => {
                let mut inner = pair.into_inner();
                let first = expect_pair(&mut inner, "expression", span)?;
                if first.as_rule() != Rule::lhs_expr {
                    return self.build_expression(first);
                }
                let target = self.build_expression(first)?;
                let op_pair = expect_pair(&mut inner, "assignment operator", span)?;
                let op = assign_op(op_pair.as_str()).ok_or_else(|| {
                    CompileError::Build(
                        format!("Unknown assignment operator '{}'", op_pair.as_str()),
                        Some(span),
                    )
                })?;
                if !target.is_assignable() {
                    return Err(CompileError::Build(
                        "Invalid assignment target".to_string(),
                        Some(target.span()),
                    ));
                }
                let value = self.build_expression(expect_pair(&mut inner, "assigned value", span)?)?;
                Ok(Expr::Assign {
                    op,
                    target: Box::new(target),
                    value: Box::new(value),
                    span,
                })
            }
            Rule::conditional => {
                let mut inner = pair.into_inner();
                let test = self.build_expression(expect_pair(&mut inner, "expression", span)?)?;
                match inner.next() {
                    None => Ok(test),
                    Some(consequent) => {
                        let consequent = self.build_expression(consequent)?;
                        let alternate =
                            self.build_expression(expect_pair(&mut inner, "':' branch", span)?)?;
                        Ok(Expr::Conditional {
                            test: Box::new(test),
                            consequent: Box::new(consequent),
                            alternate: Box::new(alternate),
                            span,
                        })
                    }
                }
            }
            Rule::nullish
            | Rule::logical_or
            | Rule::logical_and
            | Rule::bit_or
            | Rule::bit_xor
            | Rule::bit_and
            | Rule::equality
            | Rule::relational
            | Rule::shift
            | Rule::additive
            | Rule::multiplicative => self.build_binary_expr(pair),
            Rule::exponent => {
                let mut inner = pair.into_inner();
                let base = self.build_expression(expect_pair(&mut inner, "operand", span)?)?;
                match inner.next() {
                    None => Ok(base),
                    Some(_pow) => {
                        let exp = self.build_expression(expect_pair(&mut inner, "exponent", span)?)?;
                        Ok(Expr::Binary {
                            op: BinaryOp::Pow,
                            left: Box::new(base),
                            right: Box::new(exp),
                            span,
                        })
                    }
                }
            }
            Rule::unary => self.build_unary(pair),
            Rule::postfix => {
                let mut inner = pair.into_inner();
                let target = self.build_expression(expect_pair(&mut inner, "operand", span)?)?;
                match inner.next() {
                    None => Ok(target),
                    Some(op) => {
                        if !target.is_assignable() {
                            return Err(CompileError::Build(
                                "Invalid update target".to_string(),
                                Some(span),
                            ));
                        }
                        Ok(Expr::Update {
                            op: if op.as_str() == "++" {
                                UpdateOp::Inc
                            } else {
                                UpdateOp::Dec
                            },
                            prefix: false,
                            target: Box::new(target),
                            span,
                        })
                    }
                }
            }
            Rule::lhs_expr | Rule::member_chain => self.build_chain(pair),
            Rule::new_expr => {
                let mut inner = children(pair);
                let callee = self.build_expression(expect_pair(&mut inner, "constructor", span)?)?;
                let args = match inner.next() {
                    Some(args) => self.build_arguments(args)?,
                    None => Vec::new(),
                };
                Ok(Expr::New {
                    callee: Box::new(callee),
                    args,
                    span,
                })
            }
            Rule::primary | Rule::literal | Rule::paren_expr => {
                let mut inner = pair.into_inner();
                let child = expect_pair(&mut inner, "expression", span)?;
                self.build_expression(child)
            }
            Rule::function_expr => {
                let func = self.build_function(pair, false)?;
                Ok(Expr::Function { func, span })
            }
            Rule::identifier => Ok(Expr::Ident {
                name: pair.as_str().to_string(),
                span,
            }),
            Rule::kw_this => Ok(Expr::This { span }),
            Rule::kw_true => Ok(Expr::LitBool { v: true, span }),
            Rule::kw_false => Ok(Expr::LitBool { v: false, span }),
            Rule::kw_null => Ok(Expr::LitNull { span }),
            Rule::number => Ok(Expr::LitNum {
                v: parse_number(pair.as_str(), span)?,
                span,
            }),
            Rule::string => Ok(Expr::LitStr {
                v: string_contents(pair),
                span,
            }),
            Rule::array_lit => {
                let elements = pair
                    .into_inner()
                    .map(|p| self.build_expression(p))
                    .collect::<ParseResult<Vec<_>>>()?;
                Ok(Expr::LitArray { elements, span })
            }
            Rule::object_lit => self.build_object_literal(pair),
            other => Err(CompileError::Build(
                format!("Unexpected expression rule: {:?}", other),
                Some(span),
            )),
        }
    }

    fn build_binary_expr(&mut self, pair: Pair<Rule>) -> ParseResult<Expr> {
        let span = self.span(&pair);
        let mut inner = pair.into_inner();

        let mut left = self.build_expression(expect_pair(&mut inner, "operand", span)?)?;

        while let Some(op_pair) = inner.next() {
            let op_rule = op_pair.as_rule();
            let right = self.build_expression(expect_pair(
                &mut inner,
                "right operand after operator",
                span,
            )?)?;
            let new_span = left.span().merge(&right.span());

            left = match op_rule {
                Rule::op_and => logical(LogicalOp::And, left, right, new_span),
                Rule::op_or => logical(LogicalOp::Or, left, right, new_span),
                Rule::op_nullish => logical(LogicalOp::Nullish, left, right, new_span),
                _ => {
                    let op = binary_op(op_rule).ok_or_else(|| {
                        CompileError::Build(
                            format!("Expected operator rule, got {:?}", op_rule),
                            Some(span),
                        )
                    })?;
                    Expr::Binary {
                        op,
                        left: Box::new(left),
                        right: Box::new(right),
                        span: new_span,
                    }
                }
            };
        }

        Ok(left)
    }

    fn build_unary(&mut self, pair: Pair<Rule>) -> ParseResult<Expr> {
        let span = self.span(&pair);
        let mut inner = pair.into_inner();
        let first = expect_pair(&mut inner, "operand", span)?;

        match first.as_rule() {
            Rule::unary_op => {
                let op_span = self.span(&first);
                let mut op_inner = first.into_inner();
                let op = match expect_pair(&mut op_inner, "unary operator", op_span)?.as_rule() {
                    Rule::op_not => UnaryOp::Not,
                    Rule::op_bit_not => UnaryOp::BitNot,
                    Rule::op_neg => UnaryOp::Neg,
                    Rule::op_plus => UnaryOp::Plus,
                    Rule::kw_typeof => UnaryOp::TypeOf,
                    Rule::kw_void => UnaryOp::Void,
                    _ => UnaryOp::Delete,
                };
                let arg = self.build_expression(expect_pair(&mut inner, "operand", span)?)?;
                Ok(Expr::Unary {
                    op,
                    arg: Box::new(arg),
                    span,
                })
            }
            Rule::prefix_update => {
                let op = if first.as_str() == "++" {
                    UpdateOp::Inc
                } else {
                    UpdateOp::Dec
                };
                let target = self.build_expression(expect_pair(&mut inner, "operand", span)?)?;
                if !target.is_assignable() {
                    return Err(CompileError::Build(
                        "Invalid update target".to_string(),
                        Some(span),
                    ));
                }
                Ok(Expr::Update {
                    op,
                    prefix: true,
                    target: Box::new(target),
                    span,
                })
            }
            _ => self.build_expression(first),
        }
    }

    /// `primary` (or `new`) followed by call / member suffixes
    fn build_chain(&mut self, pair: Pair<Rule>) -> ParseResult<Expr> {
        let span = self.span(&pair);
        let mut inner = pair.into_inner();
        let mut expr = self.build_expression(expect_pair(&mut inner, "expression", span)?)?;

        for suffix in inner {
            let suffix_span = self.span(&suffix);
            let full = expr.span().merge(&suffix_span);
            expr = match suffix.as_rule() {
                Rule::arguments => Expr::Call {
                    callee: Box::new(expr),
                    args: self.build_arguments(suffix)?,
                    span: full,
                },
                Rule::dot_member => {
                    let mut m = suffix.into_inner();
                    let name = expect_pair(&mut m, "property name", suffix_span)?
                        .as_str()
                        .to_string();
                    Expr::Member {
                        object: Box::new(expr),
                        property: MemberProp::Named { name },
                        implicit: false,
                        span: full,
                    }
                }
                _ => {
                    let mut m = suffix.into_inner();
                    let key = self.build_expression(expect_pair(&mut m, "index", suffix_span)?)?;
                    Expr::Member {
                        object: Box::new(expr),
                        property: MemberProp::Computed { expr: Box::new(key) },
                        implicit: false,
                        span: full,
                    }
                }
            };
        }

        Ok(expr)
    }

    fn build_arguments(&mut self, pair: Pair<Rule>) -> ParseResult<Vec<Expr>> {
        pair.into_inner()
            .map(|arg| self.build_expression(arg))
            .collect()
    }

    fn build_object_literal(&mut self, pair: Pair<Rule>) -> ParseResult<Expr> {
        let span = self.span(&pair);
        let mut properties = Vec::new();

        for prop in pair.into_inner() {
            let prop_span = self.span(&prop);
            let mut inner = prop.into_inner();
            let first = expect_pair(&mut inner, "property", prop_span)?;
            match first.as_rule() {
                Rule::identifier => {
                    let name = first.as_str().to_string();
                    properties.push(PropDef {
                        key: name.clone(),
                        value: Expr::Ident {
                            name,
                            span: prop_span,
                        },
                        span: prop_span,
                    });
                }
                _ => {
                    let mut key_inner = first.into_inner();
                    let key_pair = expect_pair(&mut key_inner, "property key", prop_span)?;
                    let key = match key_pair.as_rule() {
                        Rule::string => string_contents(key_pair),
                        Rule::number => crate::executor::types::number_to_string(parse_number(
                            key_pair.as_str(),
                            prop_span,
                        )?),
                        _ => key_pair.as_str().to_string(),
                    };
                    let value =
                        self.build_expression(expect_pair(&mut inner, "property value", prop_span)?)?;
                    properties.push(PropDef {
                        key,
                        value,
                        span: prop_span,
                    });
                }
            }
        }

        Ok(Expr::LitObj { properties, span })
    }
}

/* ===================== Token Helpers ===================== */

fn logical(op: LogicalOp, left: Expr, right: Expr, span: Span) -> Expr {
    Expr::Logical {
        op,
        left: Box::new(left),
        right: Box::new(right),
        span,
    }
}

fn binary_op(rule: Rule) -> Option<BinaryOp> {
    Some(match rule {
        Rule::op_add => BinaryOp::Add,
        Rule::op_sub => BinaryOp::Sub,
        Rule::op_mul => BinaryOp::Mul,
        Rule::op_div => BinaryOp::Div,
        Rule::op_mod => BinaryOp::Mod,
        Rule::op_eq => BinaryOp::Eq,
        Rule::op_ne => BinaryOp::Ne,
        Rule::op_strict_eq => BinaryOp::StrictEq,
        Rule::op_strict_ne => BinaryOp::StrictNe,
        Rule::op_lt => BinaryOp::Lt,
        Rule::op_lte => BinaryOp::Lte,
        Rule::op_gt => BinaryOp::Gt,
        Rule::op_gte => BinaryOp::Gte,
        Rule::op_bit_and => BinaryOp::BitAnd,
        Rule::op_bit_or => BinaryOp::BitOr,
        Rule::op_bit_xor => BinaryOp::BitXor,
        Rule::op_shl => BinaryOp::Shl,
        Rule::op_shr => BinaryOp::Shr,
        Rule::op_ushr => BinaryOp::UShr,
        Rule::kw_in => BinaryOp::In,
        Rule::kw_instanceof => BinaryOp::InstanceOf,
        _ => return None,
    })
}

fn assign_op(text: &str) -> Option<AssignOp> {
    Some(match text {
        "=" => AssignOp::Assign,
        "+=" => AssignOp::Compound(BinaryOp::Add),
        "-=" => AssignOp::Compound(BinaryOp::Sub),
        "*=" => AssignOp::Compound(BinaryOp::Mul),
        "/=" => AssignOp::Compound(BinaryOp::Div),
        "%=" => AssignOp::Compound(BinaryOp::Mod),
        "**=" => AssignOp::Compound(BinaryOp::Pow),
        "&=" => AssignOp::Compound(BinaryOp::BitAnd),
        "|=" => AssignOp::Compound(BinaryOp::BitOr),
        "^=" => AssignOp::Compound(BinaryOp::BitXor),
        "<<=" => AssignOp::Compound(BinaryOp::Shl),
        ">>=" => AssignOp::Compound(BinaryOp::Shr),
        ">>>=" => AssignOp::Compound(BinaryOp::UShr),
        "&&=" => AssignOp::Logical(LogicalOp::And),
        "||=" => AssignOp::Logical(LogicalOp::Or),
        "??=" => AssignOp::Logical(LogicalOp::Nullish),
        _ => return None,
    })
}

fn parse_number(text: &str, span: Span) -> ParseResult<f64> {
    let parsed = match text.get(..2) {
        Some("0x") | Some("0X") => u64::from_str_radix(&text[2..], 16).map(|v| v as f64).ok(),
        _ => text.parse::<f64>().ok(),
    };
    parsed.ok_or_else(|| CompileError::Build(format!("Invalid number literal '{}'", text), Some(span)))
}

/// Decoded contents of a `string` pair
fn string_contents(pair: Pair<Rule>) -> String {
    let raw = pair
        .into_inner()
        .next()
        .map(|chars| chars.as_str())
        .unwrap_or("");
    unescape(raw)
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('b') => out.push('\u{8}'),
            Some('f') => out.push('\u{c}'),
            Some('v') => out.push('\u{b}'),
            Some('0') => out.push('\0'),
            Some('x') => {
                let hex: String = chars.by_ref().take(2).collect();
                if let Some(ch) = u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    out.push(ch);
                }
            }
            Some('u') => {
                let hex: String = if chars.peek() == Some(&'{') {
                    chars.next();
                    chars.by_ref().take_while(|c| *c != '}').collect()
                } else {
                    chars.by_ref().take(4).collect()
                };
                if let Some(ch) = u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    out.push(ch);
                }
            }
            Some('\n') => {}
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

#[cfg(test)]
mod unescape_tests {
    use super::unescape;

    #[test]
    fn test_unescape_sequences() {
        assert_eq!(unescape(r"a\nb"), "a\nb");
        assert_eq!(unescape(r"\x41B\u{43}"), "ABC");
        assert_eq!(unescape(r#"\'\"\\"#), "'\"\\");
    }
}
