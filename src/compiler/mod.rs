//! Compiler front end for guest programs
//!
//! Parses source with PEST, then runs the instrumentation pass that rewrites
//! global accesses and records the scope tree the executor links closures
//! against. The executor never reparses; it only walks a [`CompiledUnit`].

use std::rc::Rc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::executor::types::ast::{is_default_span, FunctionRefNode, NodeId, Span, Stmt};

mod instrument;
mod parser;

#[cfg(test)]
mod tests;

pub use parser::parse_program;

/// Identifier the root scope resolves to the engine's global object
pub const GLOBAL_NAME: &str = "global";

/// Names that only ever resolve at the root scope
pub const RESERVED_NAMES: [&str; 3] = [GLOBAL_NAME, "undefined", "NaN"];

pub const ARGUMENTS_NAME: &str = "arguments";

/// Global function whose calls evaluate code in the calling scope
pub const EVAL_NAME: &str = "eval";

/// Frame name of a top-level program activation
pub const ROOT_FUNCTION_NAME: &str = "(program)";

/* ===================== Error Types ===================== */

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    /// Source did not match the grammar
    #[error("{0}")]
    Syntax(String, Option<Span>),
    /// Parse tree could not be turned into an AST
    #[error("{0}")]
    Build(String, Option<Span>),
    /// Well-formed but rejected by instrumentation
    #[error("{0}")]
    Invalid(String, Option<Span>),
}

impl CompileError {
    pub fn span(&self) -> Option<Span> {
        match self {
            CompileError::Syntax(_, span)
            | CompileError::Build(_, span)
            | CompileError::Invalid(_, span) => *span,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            CompileError::Syntax(msg, _)
            | CompileError::Build(msg, _)
            | CompileError::Invalid(msg, _) => msg,
        }
    }
}

/* ===================== Program ===================== */

/// A parsed program
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Program {
    pub body: Vec<Stmt>,
    #[serde(default, skip_serializing_if = "is_default_span")]
    pub span: Span,
    /// Number of node ids in use, the program root included
    pub function_count: u32,
}

/* ===================== Scope Tree ===================== */

/// Compile-time description of one function (or the program root)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeTreeRecord {
    pub node: NodeId,
    /// Declared name, or a synthetic `anonymous_<id>`
    pub name: String,
    pub params: Vec<String>,
    /// Declared names with at least one reference, in binding order
    pub bindings: Vec<String>,
    /// Own name of a named function expression, when it is bound
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub self_binding: Option<String>,
    pub uses_this: bool,
    pub requires_capture: bool,
    /// Function declarations, created on entry
    pub hoisted: Vec<NodeId>,
    /// Every child literal: hoisted declarations first, then expressions
    /// in source order
    pub children: Vec<NodeId>,
    #[serde(default, skip_serializing_if = "is_default_span")]
    pub span: Span,
}

/* ===================== Compiled Unit ===================== */

/// Instrumented program plus its scope tree
#[derive(Debug, Serialize)]
pub struct CompiledUnit {
    #[serde(skip)]
    pub source: String,
    /// sha256 of the source, hex encoded
    pub hash: String,
    pub program: Program,
    pub records: Vec<ScopeTreeRecord>,
    #[serde(skip)]
    functions: Vec<Option<FunctionRefNode>>,
}

impl CompiledUnit {
    /// Instrument an already parsed program
    pub fn from_program(source: &str, program: Program) -> Result<Self, CompileError> {
        Self::from_program_in(source, program, &[])
    }

    /// Instrument a program that will run inside a scope binding `outer`
    pub fn from_program_in(
        source: &str,
        program: Program,
        outer: &[String],
    ) -> Result<Self, CompileError> {
        let Program {
            body,
            span,
            function_count,
        } = program;
        let out = instrument::instrument(body, span, function_count, outer)?;

        Ok(Self {
            source: source.to_string(),
            hash: hash_source(source),
            program: Program {
                body: out.body,
                span,
                function_count,
            },
            records: out.records,
            functions: out.functions,
        })
    }

    pub fn record(&self, id: NodeId) -> Option<&ScopeTreeRecord> {
        self.records.get(id.index())
    }

    pub fn root(&self) -> Option<&ScopeTreeRecord> {
        self.record(NodeId::ROOT)
    }

    pub fn function(&self, id: NodeId) -> Option<&FunctionRefNode> {
        self.functions.get(id.index()).and_then(|f| f.as_ref())
    }

    /// Source text covered by `span`
    pub fn slice(&self, span: Span) -> Option<&str> {
        self.source.get(span.start..span.end)
    }
}

/// Parse and instrument `source`
pub fn compile(source: &str) -> Result<Rc<CompiledUnit>, CompileError> {
    let program = parse_program(source)?;
    let unit = CompiledUnit::from_program(source, program)?;
    tracing::debug!(hash = %unit.hash, functions = unit.records.len(), "Compiled unit");
    Ok(Rc::new(unit))
}

/// Parse and instrument `source` for evaluation inside a scope binding `outer`
pub fn compile_in(source: &str, outer: &[String]) -> Result<Rc<CompiledUnit>, CompileError> {
    let program = parse_program(source)?;
    let unit = CompiledUnit::from_program_in(source, program, outer)?;
    tracing::debug!(hash = %unit.hash, outer = outer.len(), "Compiled scoped unit");
    Ok(Rc::new(unit))
}

/// Hash source code using SHA256
pub fn hash_source(source: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    format!("{:x}", hasher.finalize())
}
