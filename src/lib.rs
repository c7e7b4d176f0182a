//! Brisk: bytecode compiler and stack virtual machine for a small dynamic
//! scripting language.
//!
//! The crate takes an already-parsed [`ast::Program`], compiles it to a
//! [`bytecode::Chunk`] and runs it on a [`bytecode::Vm`]. Parsing source text
//! and binding native libraries are left to the host, which plugs them in
//! through [`module::Frontend`] and [`module::NativeLoader`].
//!
//! # Example
//!
//! ```
//! use brisk::ast::{Expr, Program, Stmt};
//! use brisk::{Session, Value};
//!
//! let mut session = Session::new();
//! let program = Program::new(vec![
//!     Stmt::let_("x", Expr::int(20)),
//!     Stmt::expr(Expr::infix(Expr::ident("x"), "*", Expr::int(2))),
//! ]);
//! assert_eq!(session.eval(&program).unwrap(), Value::Integer(40));
//! ```

#![allow(clippy::module_inception)]
#![allow(clippy::new_without_default)]
#![allow(clippy::len_without_is_empty)]

pub mod ast;
pub mod bytecode;
pub mod config;
pub mod error;
pub mod module;
pub mod session;
pub mod span;
pub mod value;

pub use error::{BriskError, CompileError, RuntimeError};
pub use session::Session;
pub use value::{Object, Value};

/// Compile and run a program in a fresh session.
pub fn run(program: &ast::Program) -> Result<Value, BriskError> {
    Session::new().eval(program)
}
