//! Bytecode disassembler for debugging.

use crate::bytecode::chunk::Chunk;
use crate::bytecode::instruction::{read_operands, OpCode};
use crate::value::{Object, Value};

/// Disassemble an instruction stream, one instruction per line.
pub fn disassemble(instructions: &[u8]) -> String {
    let mut output = String::new();
    let mut offset = 0;

    while offset < instructions.len() {
        offset = disassemble_instruction(instructions, offset, &mut output);
    }

    output
}

/// Disassemble a chunk: the top-level program, then every compiled
/// function in the constant pool.
pub fn disassemble_chunk(chunk: &Chunk) -> String {
    let mut output = String::from("== <main> ==\n");
    output.push_str(&disassemble(&chunk.instructions));

    for (index, constant) in chunk.constants.iter().enumerate() {
        if let Value::Function(function) = constant {
            output.push_str(&format!(
                "\n== {} [{}] (params: {}, locals: {}) ==\n",
                function.name.as_deref().unwrap_or("fn"),
                index,
                function.num_parameters,
                function.num_locals
            ));
            output.push_str(&disassemble(&function.instructions));
        }
    }

    output
}

/// Render the constant pool, one `index type value` line per entry.
pub fn constant_table(chunk: &Chunk) -> String {
    chunk
        .constants
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{:04} {} {}\n", i, c.type_name(), c.inspect()))
        .collect()
}

/// Disassemble a single instruction. Returns the offset of the next one.
fn disassemble_instruction(instructions: &[u8], offset: usize, output: &mut String) -> usize {
    let byte = instructions[offset];
    let Some(op) = OpCode::from_u8(byte) else {
        output.push_str(&format!("{:04} Unknown opcode {}\n", offset, byte));
        return offset + 1;
    };

    let (operands, read) = read_operands(op, &instructions[offset + 1..]);
    let mut line = format!("{:04} {}", offset, op.name());
    for operand in operands {
        line.push_str(&format!(" {}", operand));
    }
    if offset + 1 + read > instructions.len() {
        line.push_str(" <truncated>");
    }
    output.push_str(&line);
    output.push('\n');

    offset + 1 + read
}
