//! Error types for compilation, execution and bytecode artifacts.

use crate::span::Span;
use thiserror::Error;

/// Bytecode compilation errors. Any of these aborts the compile unit.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("undefined variable {0} at {1}")]
    UndefinedVariable(String, Span),

    #[error("unknown operator {0} at {1}")]
    UnknownOperator(String, Span),

    #[error("module not found: [{0}] at {1}")]
    ModuleNotFound(String, Span),

    #[error("failed to load module [{name}]: {message} at {span}")]
    ModuleLoad {
        name: String,
        message: String,
        span: Span,
    },

    #[error("invalid assignment target {0} at {1}")]
    InvalidAssignment(String, Span),

    #[error("too many constants in one compile unit")]
    TooManyConstants,

    #[error("operand {operand} does not fit in {width} byte(s) for {op}")]
    OperandOverflow {
        op: &'static str,
        operand: usize,
        width: usize,
    },
}

impl CompileError {
    pub fn module_load(name: impl Into<String>, message: impl Into<String>, span: Span) -> Self {
        Self::ModuleLoad {
            name: name.into(),
            message: message.into(),
            span,
        }
    }

    pub fn span(&self) -> Option<Span> {
        match self {
            Self::UndefinedVariable(_, span) => Some(*span),
            Self::UnknownOperator(_, span) => Some(*span),
            Self::ModuleNotFound(_, span) => Some(*span),
            Self::ModuleLoad { span, .. } => Some(*span),
            Self::InvalidAssignment(_, span) => Some(*span),
            Self::TooManyConstants | Self::OperandOverflow { .. } => None,
        }
    }
}

/// Run-terminating faults raised by the virtual machine.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("stack overflow")]
    StackOverflow,

    #[error("frame overflow: more than {0} active calls")]
    FrameOverflow(usize),

    #[error("calling non-function {0}")]
    NotCallable(&'static str),

    #[error("wrong number of arguments: want={expected}, got={got}")]
    WrongArity { expected: usize, got: usize },

    #[error("type error: {0}")]
    TypeError(String),

    /// An Error value reached an operator or call dispatch path.
    #[error("{0}")]
    Domain(String),

    #[error("index out of range: {index} (length {length})")]
    IndexOutOfBounds { index: i64, length: usize },

    #[error("unusable as hash key: {0}")]
    UnhashableKey(&'static str),

    #[error("slice assignment is not supported")]
    SliceAssignment,

    #[error("invalid opcode {0}")]
    InvalidOpcode(u8),

    #[error("{0}")]
    General(String),
}

impl RuntimeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::General(message.into())
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::TypeError(message.into())
    }

    pub fn wrong_arity(expected: usize, got: usize) -> Self {
        Self::WrongArity { expected, got }
    }
}

/// Errors encoding or decoding a bytecode artifact.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("encode failed: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("decode failed: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    #[error("constant of type {0} cannot be stored in an artifact")]
    Unsupported(&'static str),

    #[error("artifact references unknown module [{0}]")]
    UnknownModule(String),
}

/// A unified error type for all phases.
#[derive(Debug, Error)]
pub enum BriskError {
    #[error("Compile error: {0}")]
    Compile(#[from] CompileError),

    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("Artifact error: {0}")]
    Artifact(#[from] ArtifactError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
