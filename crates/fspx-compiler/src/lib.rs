//! FSP front-end: lexer, parser, evaluator and process registry.
//!
//! The compilation pipeline:
//! - `lexer` — logos tokens over the FSP source
//! - `parser` — recursive-descent construction of the typed AST
//! - `driver` — the compilation session: symbol tables, parametric registry,
//!   dependency graph, nesting discipline
//! - `eval` — context-threaded translation of definitions into LTSs
//! - `diagnostics` — error collection and rendering

pub mod ast;
pub mod diagnostics;
mod driver;
mod eval;
pub mod lexer;
mod names;
mod parser;

pub use diagnostics::{Diagnostics, DiagnosticsPrinter, Severity, Span};
pub use driver::{Definition, DependencyGraph, Driver, ParametricProcess};
pub use names::{name_extension, parse_extended_name};
pub use parser::parse;

/// The kinds of semantic error a translation can fail with.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SemanticErrorKind {
    #[error("{what} {name} undeclared")]
    Undeclared { what: &'static str, name: String },

    #[error("{name} is a {found}, expected a {expected}")]
    TypeMismatch {
        name: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("{what} {name} declared twice")]
    Duplicate { what: &'static str, name: String },

    #[error("parameter arity mismatch for process {name}: expected {expected}, got {got}")]
    ArityMismatch {
        name: String,
        expected: usize,
        got: usize,
    },

    #[error("process reference {name} unresolved")]
    UnresolvedReference { name: String },

    #[error("cannot apply the property operator: process {name} is non-deterministic")]
    NondeterministicProperty { name: String },

    #[error("maximum reference depth exceeded while translating process {name}")]
    DepthExceeded { name: String },

    #[error("division by zero")]
    DivisionByZero,

    #[error("label expression expanded to an empty set")]
    EmptyLabelSet,
}

/// A semantic error with its source span.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}")]
pub struct SemanticError {
    pub kind: SemanticErrorKind,
    pub span: Span,
}

impl SemanticError {
    pub fn new(kind: SemanticErrorKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// Errors the whole compilation can fail with. Semantic errors are not
/// recoverable within a translation: the first one aborts with a diagnostic.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("parsing failed with {} errors", .0.error_count())]
    Parse(Diagnostics),

    #[error(transparent)]
    Semantic(#[from] SemanticError),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Parses and translates an FSP source, returning the compilation session
/// with every eligible process published.
pub fn compile(source: &str, max_depth: usize, interactive: bool) -> Result<Driver> {
    let root = parser::parse(source).map_err(Error::Parse)?;
    let mut driver = Driver::new(max_depth, interactive);
    driver.compile(&root)?;
    Ok(driver)
}
