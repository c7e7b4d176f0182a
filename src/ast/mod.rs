//! Abstract Syntax Tree consumed by the bytecode compiler.
//!
//! Trees are produced by an external parser or built directly with the
//! constructor helpers on [`Expr`] and [`Stmt`].

pub mod expr;
pub mod stmt;

pub use expr::{BinaryOp, Expr, ExprKind, IndexExpr};
pub use stmt::{Program, Stmt, StmtKind};
