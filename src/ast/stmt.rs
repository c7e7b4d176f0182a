//! Statement AST nodes.

use std::fmt;

use crate::ast::expr::{write_block, Expr};
use crate::span::Span;

/// A statement in the AST.
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

impl Stmt {
    pub fn new(kind: StmtKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// Statement variants.
#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// Expression statement: expr;
    Expression(Expr),

    /// Variable declaration: let x = expr;
    Let { name: String, value: Expr },

    /// Return statement: return expr;
    Return(Expr),

    /// Block: { stmts }
    Block(Vec<Stmt>),

    /// Named scope block: scope name { stmts }
    Scope { name: String, body: Vec<Stmt> },

    /// Export a binding from the enclosing scope block: export name;
    Export(String),

    /// Compile-time module import: load name;
    Load(String),
}

impl Stmt {
    pub fn expr(expr: Expr) -> Self {
        let span = expr.span;
        Self::new(StmtKind::Expression(expr), span)
    }

    pub fn let_(name: impl Into<String>, value: Expr) -> Self {
        Self::new(
            StmtKind::Let {
                name: name.into(),
                value,
            },
            Span::default(),
        )
    }

    pub fn return_(value: Expr) -> Self {
        Self::new(StmtKind::Return(value), Span::default())
    }

    pub fn block(statements: Vec<Stmt>) -> Self {
        Self::new(StmtKind::Block(statements), Span::default())
    }

    pub fn scope(name: impl Into<String>, body: Vec<Stmt>) -> Self {
        Self::new(
            StmtKind::Scope {
                name: name.into(),
                body,
            },
            Span::default(),
        )
    }

    pub fn export(name: impl Into<String>) -> Self {
        Self::new(StmtKind::Export(name.into()), Span::default())
    }

    pub fn load(name: impl Into<String>) -> Self {
        Self::new(StmtKind::Load(name.into()), Span::default())
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            StmtKind::Expression(expr) => write!(f, "{}", expr),
            StmtKind::Let { name, value } => write!(f, "let {} = {};", name, value),
            StmtKind::Return(value) => write!(f, "return {};", value),
            StmtKind::Block(statements) => write_block(f, statements),
            StmtKind::Scope { name, body } => {
                write!(f, "scope {} ", name)?;
                write_block(f, body)
            }
            StmtKind::Export(name) => write!(f, "export {};", name),
            StmtKind::Load(name) => write!(f, "load {};", name),
        }
    }
}

/// A complete program.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub statements: Vec<Stmt>,
}

impl Program {
    pub fn new(statements: Vec<Stmt>) -> Self {
        Self { statements }
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for stmt in &self.statements {
            writeln!(f, "{}", stmt)?;
        }
        Ok(())
    }
}
