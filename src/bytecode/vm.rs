//! Stack-based virtual machine for executing bytecode.
//!
//! The operand stack is a fixed array addressed by `sp`; popping leaves the
//! value in place so the run's result can be read back from `stack[sp]`.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::ast::BinaryOp;
use crate::bytecode::chunk::Chunk;
use crate::bytecode::instruction::{read_u16, read_u8, OpCode};
use crate::config::VmConfig;
use crate::error::RuntimeError;
use crate::value::{
    Caller, Closure, CompiledFunction, Hash, Object, Scope, Value, BUILTINS,
};

/// Result type for VM operations.
pub type VMResult<T> = Result<T, RuntimeError>;

/// The globals array, shared by every VM of a session.
pub type Globals = Rc<RefCell<Vec<Value>>>;

/// A globals array of `size` Null slots.
pub fn new_globals(size: usize) -> Globals {
    Rc::new(RefCell::new(vec![Value::Null; size]))
}

/// One active call.
#[derive(Debug)]
struct CallFrame {
    closure: Rc<Closure>,
    ip: usize,
    /// Stack slot of the first argument
    base: usize,
}

/// The virtual machine.
pub struct Vm {
    config: VmConfig,
    constants: Rc<[Value]>,
    globals: Globals,
    stack: Vec<Value>,
    /// Next free slot
    sp: usize,
    frames: Vec<CallFrame>,
    /// Frames held by enclosing VMs
    depth: usize,
    /// Whether `frames[0]` is the top-level program
    has_main: bool,
}

impl Vm {
    /// A VM with default capacities and its own globals.
    pub fn new(chunk: Chunk) -> Self {
        Self::with_config(chunk, VmConfig::default())
    }

    pub fn with_config(chunk: Chunk, config: VmConfig) -> Self {
        let globals = new_globals(config.globals_size);
        Self::with_globals(chunk, globals, config)
    }

    /// A VM writing into an existing globals array.
    pub fn with_globals(chunk: Chunk, globals: Globals, config: VmConfig) -> Self {
        let main = CompiledFunction::new(chunk.instructions, 0, 0);
        let closure = Rc::new(Closure::new(Rc::new(main), Vec::new()));
        Self {
            stack: vec![Value::Null; config.stack_size],
            sp: 0,
            frames: vec![CallFrame {
                closure,
                ip: 0,
                base: 0,
            }],
            constants: Rc::from(chunk.constants),
            globals,
            config,
            depth: 0,
            has_main: true,
        }
    }

    /// A VM for a re-entrant call: same globals and constants, own stacks.
    fn nested(&self) -> Self {
        Self {
            stack: vec![Value::Null; self.config.stack_size],
            sp: 0,
            frames: Vec::new(),
            constants: self.constants.clone(),
            globals: self.globals.clone(),
            config: self.config.clone(),
            depth: self.depth + self.frames.len(),
            has_main: false,
        }
    }

    pub fn globals(&self) -> &Globals {
        &self.globals
    }

    /// The value most recently popped off the stack: the run's result.
    pub fn last_popped_stack_elem(&self) -> Value {
        self.stack.get(self.sp).cloned().unwrap_or(Value::Null)
    }

    /// Run the program to completion.
    pub fn run(&mut self) -> VMResult<()> {
        debug!(
            constants = self.constants.len(),
            stack_size = self.config.stack_size,
            "vm run started"
        );
        match self.execute() {
            Ok(()) => {
                debug!(sp = self.sp, "vm run finished");
                Ok(())
            }
            Err(err) => {
                debug!(error = %err, frames = self.frames.len(), "vm run failed");
                Err(err)
            }
        }
    }

    /// Main execution loop.
    fn execute(&mut self) -> VMResult<()> {
        loop {
            let Some(frame) = self.frames.last() else {
                return Ok(());
            };
            let instructions = &frame.closure.function.instructions;
            if frame.ip >= instructions.len() {
                // the program's end leaves the last popped value as the result
                if self.has_main && self.frames.len() == 1 {
                    return Ok(());
                }
                // falling off the end of a function returns Null
                if self.return_from_frame(Value::Null)? {
                    return Ok(());
                }
                continue;
            }

            let byte = instructions[frame.ip];
            let op = OpCode::from_u8(byte).ok_or(RuntimeError::InvalidOpcode(byte))?;
            self.frame_mut().ip += 1;

            match op {
                OpCode::Constant => {
                    let index = self.read_u16();
                    let value = self.constant(index)?;
                    self.push(value)?;
                }

                OpCode::Pop => {
                    self.pop()?;
                }

                OpCode::True => self.push(Value::Boolean(true))?,
                OpCode::False => self.push(Value::Boolean(false))?,
                OpCode::Null => self.push(Value::Null)?,

                OpCode::Add => self.binary_op(BinaryOp::Add)?,
                OpCode::Subtract => self.binary_op(BinaryOp::Subtract)?,
                OpCode::Multiply => self.binary_op(BinaryOp::Multiply)?,
                OpCode::Divide => self.binary_op(BinaryOp::Divide)?,
                OpCode::Modulo => self.binary_op(BinaryOp::Modulo)?,
                OpCode::Equal => self.binary_op(BinaryOp::Equal)?,
                OpCode::NotEqual => self.binary_op(BinaryOp::NotEqual)?,
                OpCode::Greater => self.binary_op(BinaryOp::Greater)?,
                OpCode::GreaterEqual => self.binary_op(BinaryOp::GreaterEqual)?,

                OpCode::Negate => {
                    let operand = self.pop()?;
                    let result = match operand {
                        Value::Integer(n) => Value::Integer(n.wrapping_neg()),
                        Value::Float(n) => Value::Float(-n),
                        other => {
                            return Err(RuntimeError::type_error(format!(
                                "unsupported type for negation: {}",
                                other.type_name()
                            )))
                        }
                    };
                    self.push(result)?;
                }

                OpCode::Not => {
                    let operand = self.pop()?;
                    let result = match operand {
                        Value::Boolean(b) => !b,
                        Value::Null => true,
                        _ => false,
                    };
                    self.push(Value::Boolean(result))?;
                }

                OpCode::JumpIfFalse => {
                    let target = self.read_u16();
                    let condition = self.pop()?;
                    if !condition.is_truthy() {
                        self.frame_mut().ip = target;
                    }
                }

                OpCode::Jump => {
                    let target = self.read_u16();
                    self.frame_mut().ip = target;
                }

                OpCode::GetGlobal => {
                    let index = self.read_u16();
                    let value = self
                        .globals
                        .borrow()
                        .get(index)
                        .cloned()
                        .ok_or_else(|| global_out_of_range(index))?;
                    self.push(value)?;
                }

                OpCode::SetGlobal => {
                    let index = self.read_u16();
                    let value = self.peek()?;
                    let mut globals = self.globals.borrow_mut();
                    let slot = globals
                        .get_mut(index)
                        .ok_or_else(|| global_out_of_range(index))?;
                    *slot = value;
                }

                OpCode::GetLocal => {
                    let index = self.read_u8();
                    let slot = self.frame().base + index;
                    let value = self.stack[slot].clone();
                    self.push(value)?;
                }

                OpCode::SetLocal => {
                    let index = self.read_u8();
                    let slot = self.frame().base + index;
                    let value = self.peek()?;
                    self.stack[slot] = value;
                }

                OpCode::GetFree => {
                    let index = self.read_u8();
                    let value = self
                        .frame()
                        .closure
                        .free
                        .borrow()
                        .get(index)
                        .cloned()
                        .ok_or_else(|| RuntimeError::new(format!("free index {} out of range", index)))?;
                    self.push(value)?;
                }

                OpCode::SetFree => {
                    let index = self.read_u8();
                    let value = self.peek()?;
                    let closure = self.frame().closure.clone();
                    let mut free = closure.free.borrow_mut();
                    let slot = free
                        .get_mut(index)
                        .ok_or_else(|| RuntimeError::new(format!("free index {} out of range", index)))?;
                    *slot = value;
                }

                OpCode::GetBuiltin => {
                    let index = self.read_u8();
                    let builtin = BUILTINS
                        .get(index)
                        .copied()
                        .ok_or_else(|| RuntimeError::new(format!("unknown builtin {}", index)))?;
                    self.push(Value::Builtin(builtin))?;
                }

                OpCode::BuildArray => {
                    let count = self.read_u16();
                    let elements = self.take(count)?;
                    self.push(Value::array(elements))?;
                }

                OpCode::BuildHash => {
                    let count = self.read_u16();
                    let flat = self.take(count)?;
                    let mut flat = flat.into_iter();
                    let mut pairs = Vec::with_capacity(count / 2);
                    while let (Some(key), Some(value)) = (flat.next(), flat.next()) {
                        pairs.push((key, value));
                    }
                    let hash = Hash::from_pairs(pairs).map_err(RuntimeError::UnhashableKey)?;
                    self.push(Value::Hash(hash))?;
                }

                OpCode::Index => {
                    let access = self.pop_index_access()?;
                    let result = access.get()?;
                    self.push(result)?;
                }

                OpCode::IndexSet => {
                    let access = self.pop_index_access()?;
                    let value = self.pop()?;
                    access.set(value.clone())?;
                    self.push(value)?;
                }

                OpCode::Call => {
                    let argc = self.read_u8();
                    self.call_value(argc)?;
                }

                OpCode::ReturnValue => {
                    let value = self.pop()?;
                    if self.return_from_frame(value)? {
                        return Ok(());
                    }
                }

                OpCode::Return => {
                    if self.return_from_frame(Value::Null)? {
                        return Ok(());
                    }
                }

                OpCode::Closure => {
                    let index = self.read_u16();
                    let num_free = self.read_u8();
                    let function = match self.constant(index)? {
                        Value::Function(function) => function,
                        other => {
                            return Err(RuntimeError::type_error(format!(
                                "not a function: {}",
                                other.inspect()
                            )))
                        }
                    };
                    let free = self.take(num_free)?;
                    self.push(Value::Closure(Rc::new(Closure::new(function, free))))?;
                }

                OpCode::GetMember => {
                    let name = self.pop()?;
                    let receiver = self.pop()?;
                    let name = member_name(&name)?;
                    self.push(receiver.get_member(name))?;
                }

                OpCode::SetMember => {
                    let receiver = self.pop()?;
                    let name = self.pop()?;
                    let value = self.pop()?;
                    let name = member_name(&name)?;
                    self.push(receiver.set_member(name, value))?;
                }

                OpCode::Export => {
                    let value = self.pop()?;
                    let name = self.pop()?;
                    let name = member_name(&name)?.to_string();
                    self.frame().closure.exports.borrow_mut().insert(name, value);
                }

                OpCode::Scope => {
                    let closure = &self.frame().closure;
                    let scope = Scope {
                        name: closure.function.name.clone().unwrap_or_default(),
                        exports: closure.exports.borrow().clone(),
                    };
                    self.push(Value::Scope(Rc::new(scope)))?;
                }

                OpCode::ScopeResolve => {
                    let name = self.pop()?;
                    let scope = self.pop()?;
                    let name = member_name(&name)?;
                    match scope {
                        Value::Scope(scope) => self.push(scope.get_member(name))?,
                        other => {
                            return Err(RuntimeError::type_error(format!(
                                "scope resolution on non-scope {}",
                                other.type_name()
                            )))
                        }
                    }
                }
            }
        }
    }

    // ===== Calls =====

    fn call_value(&mut self, argc: usize) -> VMResult<()> {
        let callee_slot = self
            .sp
            .checked_sub(argc + 1)
            .ok_or_else(|| RuntimeError::new("stack underflow"))?;
        let callee = self.stack[callee_slot].clone();

        let result = match callee {
            Value::Closure(closure) => return self.call_closure(closure, argc),
            Value::Builtin(builtin) => {
                let args = self.take(argc)?;
                self.pop()?;
                (builtin.func)(self, &args)
            }
            Value::Member(member) => {
                let args = self.take(argc)?;
                self.pop()?;
                member.invoke(&args)
            }
            other => return Err(RuntimeError::NotCallable(other.type_name())),
        };

        if let Value::Error(err) = &result {
            return Err(RuntimeError::Domain(err.message().to_string()));
        }
        self.push(result)
    }

    fn call_closure(&mut self, closure: Rc<Closure>, argc: usize) -> VMResult<()> {
        let function = closure.function.clone();
        if argc != function.num_parameters {
            return Err(RuntimeError::wrong_arity(function.num_parameters, argc));
        }
        if self.depth + self.frames.len() >= self.config.max_frames {
            return Err(RuntimeError::FrameOverflow(self.config.max_frames));
        }

        let base = self.sp - argc;
        let top = base + function.num_locals.max(argc);
        if top > self.stack.len() {
            return Err(RuntimeError::StackOverflow);
        }
        for slot in &mut self.stack[base + argc..top] {
            *slot = Value::Null;
        }
        self.sp = top;

        trace!(depth = self.depth + self.frames.len(), argc, "call");
        self.frames.push(CallFrame {
            closure,
            ip: 0,
            base,
        });
        Ok(())
    }

    /// Unwind the current frame. Returns true when the run is over.
    fn return_from_frame(&mut self, value: Value) -> VMResult<bool> {
        if self.has_main && self.frames.len() == 1 {
            // top-level return: the value becomes the result
            if let Some(slot) = self.stack.get_mut(self.sp) {
                *slot = value;
            }
            return Ok(true);
        }

        let frame = self
            .frames
            .pop()
            .ok_or_else(|| RuntimeError::new("return outside of a call"))?;
        self.sp = frame.base.saturating_sub(1);
        self.push(value)?;
        Ok(self.frames.is_empty())
    }

    // ===== Stack =====

    fn push(&mut self, value: Value) -> VMResult<()> {
        let slot = self
            .stack
            .get_mut(self.sp)
            .ok_or(RuntimeError::StackOverflow)?;
        *slot = value;
        self.sp += 1;
        Ok(())
    }

    fn pop(&mut self) -> VMResult<Value> {
        if self.sp == 0 {
            return Err(RuntimeError::new("stack underflow"));
        }
        self.sp -= 1;
        Ok(self.stack[self.sp].clone())
    }

    fn peek(&self) -> VMResult<Value> {
        self.sp
            .checked_sub(1)
            .map(|top| self.stack[top].clone())
            .ok_or_else(|| RuntimeError::new("stack underflow"))
    }

    /// Pop the top `count` values, oldest first.
    fn take(&mut self, count: usize) -> VMResult<Vec<Value>> {
        let start = self
            .sp
            .checked_sub(count)
            .ok_or_else(|| RuntimeError::new("stack underflow"))?;
        let values = self.stack[start..self.sp].to_vec();
        self.sp = start;
        Ok(values)
    }

    fn binary_op(&mut self, op: BinaryOp) -> VMResult<()> {
        let right = self.pop()?;
        let left = self.pop()?;
        let result = left.infix_operation(op, &right);
        if let Value::Error(err) = &result {
            return Err(RuntimeError::Domain(err.message().to_string()));
        }
        self.push(result)
    }

    fn pop_index_access(&mut self) -> VMResult<IndexAccess> {
        let has_step = self.pop()?.is_truthy();
        let step = self.pop()?;
        let has_upper = self.pop()?.is_truthy();
        let upper = self.pop()?;
        let index = self.pop()?;
        let receiver = self.pop()?;
        Ok(IndexAccess {
            receiver,
            index,
            upper,
            has_upper,
            step,
            has_step,
        })
    }

    // ===== Frames and operands =====

    fn frame(&self) -> &CallFrame {
        &self.frames[self.frames.len() - 1]
    }

    fn frame_mut(&mut self) -> &mut CallFrame {
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    fn read_u16(&mut self) -> usize {
        let frame = self.frame_mut();
        let value = read_u16(&frame.closure.function.instructions, frame.ip);
        frame.ip += 2;
        value as usize
    }

    fn read_u8(&mut self) -> usize {
        let frame = self.frame_mut();
        let value = read_u8(&frame.closure.function.instructions, frame.ip);
        frame.ip += 1;
        value as usize
    }

    fn constant(&self, index: usize) -> VMResult<Value> {
        self.constants
            .get(index)
            .cloned()
            .ok_or_else(|| RuntimeError::new(format!("constant {} out of range", index)))
    }
}

impl Caller for Vm {
    /// Run `callee` to completion on a nested VM.
    fn call(&mut self, callee: &Value, args: &[Value]) -> VMResult<Value> {
        let mut nested = self.nested();
        debug!(depth = nested.depth, argc = args.len(), "nested call");
        nested.push(callee.clone())?;
        for arg in args {
            nested.push(arg.clone())?;
        }
        nested.call_value(args.len())?;
        nested.execute()?;
        nested.pop()
    }
}

fn global_out_of_range(index: usize) -> RuntimeError {
    RuntimeError::new(format!("global index {} out of range", index))
}

fn member_name(name: &Value) -> VMResult<&str> {
    match name {
        Value::Str(s) => Ok(s.as_str()),
        other => Err(RuntimeError::type_error(format!(
            "member name must be String, got {}",
            other.type_name()
        ))),
    }
}

/// The six values of one index or slice operation.
struct IndexAccess {
    receiver: Value,
    index: Value,
    upper: Value,
    has_upper: bool,
    step: Value,
    has_step: bool,
}

/// Positions selected by an index or slice.
enum Selection {
    Element(usize),
    Missing,
    Range(Vec<usize>),
}

impl IndexAccess {
    fn get(&self) -> VMResult<Value> {
        match &self.receiver {
            Value::Array(array) => {
                let elements = array.borrow();
                Ok(match self.select(elements.len())? {
                    Selection::Element(i) => elements[i].clone(),
                    Selection::Missing => Value::Null,
                    Selection::Range(range) => {
                        Value::array(range.into_iter().map(|i| elements[i].clone()).collect())
                    }
                })
            }
            Value::Str(s) => {
                let chars: Vec<char> = s.as_str().chars().collect();
                Ok(match self.select(chars.len())? {
                    Selection::Element(i) => Value::string(chars[i].to_string()),
                    Selection::Missing => Value::Null,
                    Selection::Range(range) => {
                        Value::string(range.into_iter().map(|i| chars[i]).collect::<String>())
                    }
                })
            }
            Value::Bytes(b) => {
                let bytes = b.as_slice();
                Ok(match self.select(bytes.len())? {
                    Selection::Element(i) => Value::Integer(bytes[i] as i64),
                    Selection::Missing => Value::Null,
                    Selection::Range(range) => {
                        Value::bytes(range.into_iter().map(|i| bytes[i]).collect::<Vec<u8>>())
                    }
                })
            }
            Value::Hash(hash) => {
                if self.has_upper {
                    return Err(RuntimeError::type_error("cannot slice a Hash"));
                }
                let key = self
                    .index
                    .hash_key()
                    .ok_or_else(|| RuntimeError::UnhashableKey(self.index.type_name()))?;
                Ok(hash.get(&key).unwrap_or(Value::Null))
            }
            other => Err(RuntimeError::type_error(format!(
                "index operator not supported: {}",
                other.type_name()
            ))),
        }
    }

    fn set(&self, value: Value) -> VMResult<()> {
        if self.has_upper {
            return Err(RuntimeError::SliceAssignment);
        }
        match &self.receiver {
            Value::Array(array) => {
                let index = integer_operand("index", &self.index)?;
                let mut elements = array.borrow_mut();
                let length = elements.len();
                match normalize(index, length) {
                    Some(i) if i < length as i64 => {
                        elements[i as usize] = value;
                        Ok(())
                    }
                    _ => Err(RuntimeError::IndexOutOfBounds { index, length }),
                }
            }
            Value::Hash(hash) => hash
                .insert(self.index.clone(), value)
                .map_err(RuntimeError::UnhashableKey),
            other => Err(RuntimeError::type_error(format!(
                "index assignment not supported: {}",
                other.type_name()
            ))),
        }
    }

    /// Resolve the index operands against a sequence of `len` items.
    fn select(&self, len: usize) -> VMResult<Selection> {
        let index = integer_operand("index", &self.index)?;

        if !self.has_upper {
            return Ok(match normalize(index, len) {
                Some(i) if i < len as i64 => Selection::Element(i as usize),
                _ => Selection::Missing,
            });
        }

        let lower = clamp(index, len);
        let upper = match &self.upper {
            Value::Null => len,
            other => clamp(integer_operand("slice bound", other)?, len),
        };
        let step = if self.has_step {
            integer_operand("slice step", &self.step)?
        } else {
            1
        };
        if step <= 0 {
            return Err(RuntimeError::type_error(format!(
                "slice step must be positive, got {}",
                step
            )));
        }

        let range = if lower < upper {
            (lower..upper).step_by(step as usize).collect()
        } else {
            Vec::new()
        };
        Ok(Selection::Range(range))
    }
}

fn integer_operand(what: &str, value: &Value) -> VMResult<i64> {
    match value {
        Value::Integer(n) => Ok(*n),
        other => Err(RuntimeError::type_error(format!(
            "{} must be Integer, got {}",
            what,
            other.type_name()
        ))),
    }
}

/// Count negative indices from the end. `None` if still negative.
fn normalize(index: i64, len: usize) -> Option<i64> {
    let index = if index < 0 { index + len as i64 } else { index };
    (index >= 0).then_some(index)
}

fn clamp(index: i64, len: usize) -> usize {
    normalize(index, len).map_or(0, |i| i.min(len as i64) as usize)
}
