//! Bytecode compiler and virtual machine.
//!
//! # Architecture
//!
//! - `instruction`: opcode definitions and operand encoding
//! - `symbol_table`: lexical name resolution (global, local, builtin, free)
//! - `compiler`: transforms the syntax tree into a [`Chunk`]
//! - `chunk`: instructions plus constant pool, and the on-disk artifact
//! - `vm`: stack-based virtual machine for executing bytecode
//! - `disassembler`: debug output for bytecode inspection

pub mod chunk;
pub mod compiler;
pub mod disassembler;
pub mod instruction;
pub mod symbol_table;
pub mod vm;

pub use chunk::Chunk;
pub use compiler::{global_symbols, Compiler};
pub use disassembler::{disassemble, disassemble_chunk};
pub use instruction::{make, OpCode};
pub use symbol_table::{Symbol, SymbolScope, SymbolTable};
pub use vm::{new_globals, Globals, Vm, VMResult};
