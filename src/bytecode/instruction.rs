//! Bytecode instruction definitions for the brisk VM.
//!
//! Every instruction is one opcode byte followed by zero or more fixed-width
//! operands. Operands are big-endian.

use crate::error::CompileError;

/// Opcodes for the bytecode virtual machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    // ============ Constants & Stack ============
    /// Load a constant from the constant pool: CONSTANT <index:u16>
    Constant = 0,
    /// Pop the top value from the stack
    Pop,
    /// Push true onto the stack
    True,
    /// Push false onto the stack
    False,
    /// Push null onto the stack
    Null,

    // ============ Arithmetic ============
    /// Add two values: a + b
    Add,
    /// Subtract two values: a - b
    Subtract,
    /// Multiply two values: a * b
    Multiply,
    /// Divide two values: a / b
    Divide,
    /// Modulo: a % b
    Modulo,
    /// Negate a value: -a
    Negate,

    // ============ Comparison ============
    /// Equal: a == b
    Equal,
    /// Not equal: a != b
    NotEqual,
    /// Greater than: a > b (`<` is compiled with swapped operands)
    Greater,
    /// Greater or equal: a >= b
    GreaterEqual,

    // ============ Logic ============
    /// Logical not: !a
    Not,

    // ============ Control Flow ============
    /// Pop the condition and jump if it is not truthy: JUMP_IF_FALSE <target:u16>
    JumpIfFalse,
    /// Unconditional jump: JUMP <target:u16>
    Jump,

    // ============ Variables ============
    /// Get a global variable: GET_GLOBAL <slot:u16>
    GetGlobal,
    /// Set a global variable, leaving the value on the stack: SET_GLOBAL <slot:u16>
    SetGlobal,
    /// Get a local variable: GET_LOCAL <slot:u8>
    GetLocal,
    /// Set a local variable, leaving the value on the stack: SET_LOCAL <slot:u8>
    SetLocal,
    /// Get a captured variable: GET_FREE <index:u8>
    GetFree,
    /// Set a captured variable, leaving the value on the stack: SET_FREE <index:u8>
    SetFree,
    /// Push a builtin function: GET_BUILTIN <index:u8>
    GetBuiltin,

    // ============ Collections ============
    /// Build an array from stack values: BUILD_ARRAY <count:u16>
    BuildArray,
    /// Build a hash from key/value stack values: BUILD_HASH <count:u16>
    BuildHash,
    /// Index or slice: receiver, index, upper, has_upper, step, has_step
    Index,
    /// Index assignment: value, receiver, index, upper, has_upper, step, has_step
    IndexSet,

    // ============ Functions ============
    /// Call a function: CALL <arg_count:u8>
    Call,
    /// Return the value on top of the stack
    ReturnValue,
    /// Return null
    Return,
    /// Create a closure: CLOSURE <function_index:u16> <free_count:u8>
    Closure,

    // ============ Members & Scopes ============
    /// Get a member: receiver, name
    GetMember,
    /// Set a member: value, name, receiver
    SetMember,
    /// Write to the running closure's export table: name, value
    Export,
    /// Push a Scope built from the running closure's export table
    Scope,
    /// Resolve a name in a Scope: scope, name
    ScopeResolve,
}

impl OpCode {
    /// Operand widths in bytes, in encoding order.
    pub fn operand_widths(self) -> &'static [usize] {
        match self {
            OpCode::Constant
            | OpCode::JumpIfFalse
            | OpCode::Jump
            | OpCode::GetGlobal
            | OpCode::SetGlobal
            | OpCode::BuildArray
            | OpCode::BuildHash => &[2],

            OpCode::GetLocal
            | OpCode::SetLocal
            | OpCode::GetFree
            | OpCode::SetFree
            | OpCode::GetBuiltin
            | OpCode::Call => &[1],

            OpCode::Closure => &[2, 1],

            _ => &[],
        }
    }

    /// Total operand size in bytes.
    pub fn operand_size(self) -> usize {
        self.operand_widths().iter().sum()
    }

    /// Convert from u8 to OpCode.
    pub fn from_u8(byte: u8) -> Option<OpCode> {
        if byte <= OpCode::ScopeResolve as u8 {
            Some(unsafe { std::mem::transmute::<u8, OpCode>(byte) })
        } else {
            None
        }
    }

    /// Mnemonic used by the disassembler.
    pub fn name(self) -> &'static str {
        match self {
            OpCode::Constant => "OpConstant",
            OpCode::Pop => "OpPop",
            OpCode::True => "OpTrue",
            OpCode::False => "OpFalse",
            OpCode::Null => "OpNull",
            OpCode::Add => "OpAdd",
            OpCode::Subtract => "OpSub",
            OpCode::Multiply => "OpMul",
            OpCode::Divide => "OpDiv",
            OpCode::Modulo => "OpMod",
            OpCode::Negate => "OpMinus",
            OpCode::Equal => "OpEqual",
            OpCode::NotEqual => "OpNotEqual",
            OpCode::Greater => "OpGreaterThan",
            OpCode::GreaterEqual => "OpGreaterOrEqual",
            OpCode::Not => "OpBang",
            OpCode::JumpIfFalse => "OpJumpNotTruthy",
            OpCode::Jump => "OpJump",
            OpCode::GetGlobal => "OpGetGlobal",
            OpCode::SetGlobal => "OpSetGlobal",
            OpCode::GetLocal => "OpGetLocal",
            OpCode::SetLocal => "OpSetLocal",
            OpCode::GetFree => "OpGetFree",
            OpCode::SetFree => "OpSetFree",
            OpCode::GetBuiltin => "OpGetBuiltin",
            OpCode::BuildArray => "OpArray",
            OpCode::BuildHash => "OpHash",
            OpCode::Index => "OpIndex",
            OpCode::IndexSet => "OpIndexSet",
            OpCode::Call => "OpCall",
            OpCode::ReturnValue => "OpReturnValue",
            OpCode::Return => "OpReturn",
            OpCode::Closure => "OpClosure",
            OpCode::GetMember => "OpMember",
            OpCode::SetMember => "OpMemberSet",
            OpCode::Export => "OpExport",
            OpCode::Scope => "OpScope",
            OpCode::ScopeResolve => "OpScopeResolve",
        }
    }
}

impl From<OpCode> for u8 {
    fn from(op: OpCode) -> u8 {
        op as u8
    }
}

/// Encode one instruction.
///
/// Fails when an operand does not fit its width, or when the operand count
/// does not match the opcode.
pub fn make(op: OpCode, operands: &[usize]) -> Result<Vec<u8>, CompileError> {
    let widths = op.operand_widths();
    let mut instruction = Vec::with_capacity(1 + op.operand_size());
    instruction.push(op as u8);

    for (i, &width) in widths.iter().enumerate() {
        let operand = operands.get(i).copied().unwrap_or(0);
        let overflow = CompileError::OperandOverflow {
            op: op.name(),
            operand,
            width,
        };
        match width {
            2 => {
                let value = u16::try_from(operand).map_err(|_| overflow)?;
                instruction.extend_from_slice(&value.to_be_bytes());
            }
            1 => {
                let value = u8::try_from(operand).map_err(|_| overflow)?;
                instruction.push(value);
            }
            _ => return Err(overflow),
        }
    }

    Ok(instruction)
}

/// Decode the operands that follow an opcode. Returns the operands and the
/// number of bytes consumed.
pub fn read_operands(op: OpCode, bytes: &[u8]) -> (Vec<usize>, usize) {
    let mut operands = Vec::with_capacity(op.operand_widths().len());
    let mut offset = 0;

    for &width in op.operand_widths() {
        match width {
            2 => operands.push(read_u16(bytes, offset) as usize),
            _ => operands.push(read_u8(bytes, offset) as usize),
        }
        offset += width;
    }

    (operands, offset)
}

/// Read a big-endian u16 at `offset`. Missing bytes read as zero.
pub fn read_u16(bytes: &[u8], offset: usize) -> u16 {
    let hi = bytes.get(offset).copied().unwrap_or(0) as u16;
    let lo = bytes.get(offset + 1).copied().unwrap_or(0) as u16;
    (hi << 8) | lo
}

pub fn read_u8(bytes: &[u8], offset: usize) -> u8 {
    bytes.get(offset).copied().unwrap_or(0)
}
