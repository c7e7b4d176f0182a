//! Bytecode compiler: transforms the AST into bytecode.
//!
//! One traversal per compile unit. Each function literal (and each scope
//! block) gets its own compilation scope; all scopes share one constant
//! pool.

use std::collections::HashSet;
use std::path::PathBuf;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::ast::{BinaryOp, Expr, ExprKind, IndexExpr, Program, Stmt, StmtKind};
use crate::bytecode::chunk::Chunk;
use crate::bytecode::instruction::{make, OpCode};
use crate::bytecode::symbol_table::{Symbol, SymbolScope, SymbolTable};
use crate::error::CompileError;
use crate::module::{LoadedModule, ModuleLoader};
use crate::span::Span;
use crate::value::{CompiledFunction, Value, BUILTINS};

/// Result type for compilation.
pub type CompileResult<T> = Result<T, CompileError>;

/// Placeholder operand for jumps that are patched later.
const JUMP_PLACEHOLDER: usize = 0xFFFF;

const MAX_CONSTANTS: usize = 0xFFFF;

#[derive(Debug, Clone, Copy)]
struct EmittedInstruction {
    opcode: OpCode,
    position: usize,
    /// A Pop discarding an expression statement's value
    discards_result: bool,
}

/// Instruction buffer of one function body.
#[derive(Debug, Default)]
struct CompilationScope {
    instructions: Vec<u8>,
    last: Option<EmittedInstruction>,
    previous: Option<EmittedInstruction>,
}

/// The bytecode compiler.
pub struct Compiler {
    constants: Vec<Value>,
    symbols: SymbolTable,
    /// Innermost scope last
    scopes: Vec<CompilationScope>,
    loader: Rc<ModuleLoader>,
    /// Source modules already compiled into this unit
    inlined: HashSet<PathBuf>,
}

/// A fresh global symbol table with the builtin table bound.
pub fn global_symbols() -> SymbolTable {
    let mut symbols = SymbolTable::new();
    for (index, builtin) in BUILTINS.iter().enumerate() {
        symbols.define_builtin(index, builtin.name);
    }
    symbols
}

impl Compiler {
    /// Create a new compiler.
    pub fn new() -> Self {
        Self::with_state(global_symbols(), Vec::new())
    }

    /// Resume against an existing global symbol table and constant pool.
    pub fn with_state(symbols: SymbolTable, constants: Vec<Value>) -> Self {
        Self {
            constants,
            symbols,
            scopes: vec![CompilationScope::default()],
            loader: Rc::new(ModuleLoader::default()),
            inlined: HashSet::new(),
        }
    }

    pub fn with_loader(mut self, loader: Rc<ModuleLoader>) -> Self {
        self.loader = loader;
        self
    }

    /// Compile a program into the current unit.
    pub fn compile(&mut self, program: &Program) -> CompileResult<()> {
        for stmt in &program.statements {
            self.compile_statement(stmt)?;
        }
        debug!(
            bytes = self.current_instructions().len(),
            constants = self.constants.len(),
            "compile unit finished"
        );
        Ok(())
    }

    /// The compiled top-level instructions and the constant pool.
    pub fn bytecode(&self) -> Chunk {
        Chunk::new(self.current_instructions().to_vec(), self.constants.clone())
    }

    /// Hand back the global symbol table and constant pool.
    pub fn into_state(self) -> (SymbolTable, Vec<Value>) {
        (self.symbols, self.constants)
    }

    // ===== Statements =====

    fn compile_statement(&mut self, stmt: &Stmt) -> CompileResult<()> {
        match &stmt.kind {
            StmtKind::Expression(expr) => {
                self.compile_expression(expr)?;
                self.emit(OpCode::Pop, &[])?;
                if let Some(last) = self.scope_mut().last.as_mut() {
                    last.discards_result = true;
                }
            }
            StmtKind::Let { name, value } => {
                let symbol = self.symbols.define(name);
                self.compile_expression(value)?;
                self.store_symbol(&symbol, stmt.span)?;
                self.emit(OpCode::Pop, &[])?;
            }
            StmtKind::Return(value) => {
                self.compile_expression(value)?;
                self.emit(OpCode::ReturnValue, &[])?;
            }
            StmtKind::Block(statements) => self.compile_block(statements)?,
            StmtKind::Scope { name, body } => self.compile_scope_block(name, body, stmt.span)?,
            StmtKind::Export(name) => {
                let symbol = self
                    .symbols
                    .resolve(name)
                    .ok_or_else(|| CompileError::UndefinedVariable(name.clone(), stmt.span))?;
                self.emit_constant(Value::string(name.as_str()))?;
                self.load_symbol(&symbol)?;
                self.emit(OpCode::Export, &[])?;
            }
            StmtKind::Load(name) => self.compile_load(name, stmt.span)?,
        }
        Ok(())
    }

    fn compile_block(&mut self, statements: &[Stmt]) -> CompileResult<()> {
        for stmt in statements {
            self.compile_statement(stmt)?;
        }
        Ok(())
    }

    /// `scope name { body }` runs `body` as an immediately invoked
    /// closure whose result is a Scope of its exports.
    fn compile_scope_block(&mut self, name: &str, body: &[Stmt], span: Span) -> CompileResult<()> {
        self.enter_scope();
        self.compile_block(body)?;
        self.emit(OpCode::Scope, &[])?;
        self.emit(OpCode::ReturnValue, &[])?;
        let (instructions, free_symbols, num_locals) = self.leave_scope();

        let function = CompiledFunction::new(instructions, num_locals, 0).named(name);
        self.emit_closure(function, &free_symbols)?;
        self.emit(OpCode::Call, &[0])?;

        let symbol = self.symbols.define(name);
        self.store_symbol(&symbol, span)?;
        self.emit(OpCode::Pop, &[])?;
        Ok(())
    }

    fn compile_load(&mut self, name: &str, span: Span) -> CompileResult<()> {
        let module = self
            .loader
            .load(name)
            .map_err(|message| CompileError::module_load(name, message, span))?
            .ok_or_else(|| CompileError::ModuleNotFound(name.to_string(), span))?;

        match module {
            LoadedModule::Scope(scope) => {
                self.emit_constant(Value::Scope(Rc::new(scope)))?;
                let symbol = self.symbols.define(name);
                self.store_symbol(&symbol, span)?;
                self.emit(OpCode::Pop, &[])?;
            }
            LoadedModule::Source { path, program } => {
                if !self.inlined.insert(path) {
                    trace!(module = name, "source module already inlined");
                    return Ok(());
                }
                self.compile_block(&program.statements)?;
            }
        }
        Ok(())
    }

    // ===== Expressions =====

    fn compile_expression(&mut self, expr: &Expr) -> CompileResult<()> {
        match &expr.kind {
            ExprKind::IntLiteral(n) => self.emit_constant(Value::Integer(*n))?,
            ExprKind::FloatLiteral(n) => self.emit_constant(Value::Float(*n))?,
            ExprKind::StringLiteral(s) => self.emit_constant(Value::string(s.as_str()))?,
            ExprKind::BoolLiteral(b) => {
                let op = if *b { OpCode::True } else { OpCode::False };
                self.emit(op, &[])?;
            }

            ExprKind::Identifier(name) => {
                let symbol = self
                    .symbols
                    .resolve(name)
                    .ok_or_else(|| CompileError::UndefinedVariable(name.clone(), expr.span))?;
                self.load_symbol(&symbol)?;
            }

            ExprKind::Array(elements) => {
                for element in elements {
                    self.compile_expression(element)?;
                }
                self.emit(OpCode::BuildArray, &[elements.len()])?;
            }

            ExprKind::Hash(pairs) => {
                let mut sorted: Vec<(String, &Expr, &Expr)> = pairs
                    .iter()
                    .map(|(key, value)| (key.to_string(), key, value))
                    .collect();
                sorted.sort_by(|a, b| a.0.cmp(&b.0));
                for (text, key, value) in sorted {
                    match &key.kind {
                        ExprKind::Identifier(name) if self.symbols.resolve(name).is_none() => {
                            self.emit_constant(Value::string(text))?;
                        }
                        _ => self.compile_expression(key)?,
                    }
                    self.compile_expression(value)?;
                }
                self.emit(OpCode::BuildHash, &[pairs.len() * 2])?;
            }

            ExprKind::Function { parameters, body } => {
                self.enter_scope();
                for parameter in parameters {
                    self.symbols.define(parameter);
                }
                self.compile_block(body)?;
                if self.last_discards_result() {
                    self.replace_last_pop_with_return();
                }
                if !self.last_instruction_is(OpCode::ReturnValue) {
                    self.emit(OpCode::Return, &[])?;
                }
                let (instructions, free_symbols, num_locals) = self.leave_scope();

                let function = CompiledFunction::new(instructions, num_locals, parameters.len());
                self.emit_closure(function, &free_symbols)?;
            }

            ExprKind::Prefix { operator, right } => {
                self.compile_expression(right)?;
                match operator.as_str() {
                    "!" => self.emit(OpCode::Not, &[])?,
                    "-" => self.emit(OpCode::Negate, &[])?,
                    _ => return Err(CompileError::UnknownOperator(operator.clone(), expr.span)),
                };
            }

            ExprKind::Infix {
                left,
                operator,
                right,
            } => self.compile_infix(left, operator, right, expr.span)?,

            ExprKind::If {
                condition,
                consequence,
                alternative,
            } => {
                self.compile_expression(condition)?;
                let jump_if_false = self.emit(OpCode::JumpIfFalse, &[JUMP_PLACEHOLDER])?;

                self.compile_branch(consequence)?;
                let jump = self.emit(OpCode::Jump, &[JUMP_PLACEHOLDER])?;

                let after_consequence = self.current_instructions().len();
                self.change_operand(jump_if_false, after_consequence)?;

                match alternative {
                    Some(alternative) => self.compile_branch(alternative)?,
                    None => {
                        self.emit(OpCode::Null, &[])?;
                    }
                }

                let after_alternative = self.current_instructions().len();
                self.change_operand(jump, after_alternative)?;
            }

            ExprKind::Loop { condition, body } => {
                let loop_start = self.current_instructions().len();
                self.compile_expression(condition)?;
                let jump_if_false = self.emit(OpCode::JumpIfFalse, &[JUMP_PLACEHOLDER])?;

                self.compile_block(body)?;
                self.emit(OpCode::Jump, &[loop_start])?;

                let after_body = self.current_instructions().len();
                self.change_operand(jump_if_false, after_body)?;
                self.emit(OpCode::Null, &[])?;
            }

            ExprKind::Call {
                function,
                arguments,
            } => {
                self.compile_expression(function)?;
                for argument in arguments {
                    self.compile_expression(argument)?;
                }
                self.emit(OpCode::Call, &[arguments.len()])?;
            }

            ExprKind::Index(index) => {
                self.compile_index_operands(index)?;
                self.emit(OpCode::Index, &[])?;
            }
        }
        Ok(())
    }

    fn compile_infix(
        &mut self,
        left: &Expr,
        operator: &str,
        right: &Expr,
        span: Span,
    ) -> CompileResult<()> {
        match operator {
            "=" => return self.compile_assignment(left, right, span),
            "." | "::" => {
                self.compile_expression(left)?;
                self.compile_name(right)?;
                let op = if operator == "." {
                    OpCode::GetMember
                } else {
                    OpCode::ScopeResolve
                };
                self.emit(op, &[])?;
                return Ok(());
            }
            _ => {}
        }

        let op = BinaryOp::from_symbol(operator)
            .ok_or_else(|| CompileError::UnknownOperator(operator.to_string(), span))?;

        // a < b is compiled as b > a
        let (first, second) = match op {
            BinaryOp::Less | BinaryOp::LessEqual => (right, left),
            _ => (left, right),
        };
        self.compile_expression(first)?;
        self.compile_expression(second)?;

        let opcode = match op {
            BinaryOp::Add => OpCode::Add,
            BinaryOp::Subtract => OpCode::Subtract,
            BinaryOp::Multiply => OpCode::Multiply,
            BinaryOp::Divide => OpCode::Divide,
            BinaryOp::Modulo => OpCode::Modulo,
            BinaryOp::Equal => OpCode::Equal,
            BinaryOp::NotEqual => OpCode::NotEqual,
            BinaryOp::Greater | BinaryOp::Less => OpCode::Greater,
            BinaryOp::GreaterEqual | BinaryOp::LessEqual => OpCode::GreaterEqual,
        };
        self.emit(opcode, &[])?;
        Ok(())
    }

    /// Member names are plain strings, never variable lookups.
    fn compile_name(&mut self, name: &Expr) -> CompileResult<()> {
        match &name.kind {
            ExprKind::Identifier(ident) => self.emit_constant(Value::string(ident.as_str())),
            _ => self.compile_expression(name),
        }
    }

    fn compile_assignment(&mut self, target: &Expr, value: &Expr, span: Span) -> CompileResult<()> {
        match &target.kind {
            ExprKind::Identifier(name) => {
                let symbol = match self.symbols.resolve(name) {
                    Some(symbol) if symbol.scope == SymbolScope::Builtin => {
                        return Err(CompileError::InvalidAssignment(name.clone(), span));
                    }
                    Some(symbol) => symbol,
                    None => self.symbols.define(name),
                };
                self.compile_expression(value)?;
                self.store_symbol(&symbol, span)
            }
            // value, receiver, index, upper, hasUpper, step, hasSkip
            ExprKind::Index(index) => {
                self.compile_expression(value)?;
                self.compile_index_operands(index)?;
                self.emit(OpCode::IndexSet, &[])?;
                Ok(())
            }
            // value, name, receiver
            ExprKind::Infix {
                left,
                operator,
                right,
            } if operator == "." => {
                self.compile_expression(value)?;
                self.emit_constant(Value::string(right.to_string()))?;
                self.compile_expression(left)?;
                self.emit(OpCode::SetMember, &[])?;
                Ok(())
            }
            _ => Err(CompileError::InvalidAssignment(target.to_string(), span)),
        }
    }

    /// Push receiver, index, upper, hasUpper, step, hasSkip.
    fn compile_index_operands(&mut self, index: &IndexExpr) -> CompileResult<()> {
        self.compile_expression(&index.left)?;
        match &index.index {
            Some(lower) => self.compile_expression(lower)?,
            None => self.emit_constant(Value::Integer(0))?,
        }
        match &index.upper {
            Some(upper) => self.compile_expression(upper)?,
            None => {
                self.emit(OpCode::Null, &[])?;
            }
        }
        self.emit_constant(Value::Boolean(index.has_upper))?;
        match &index.step {
            Some(step) => self.compile_expression(step)?,
            None => self.emit_constant(Value::Integer(1))?,
        }
        self.emit_constant(Value::Boolean(index.has_step))?;
        Ok(())
    }

    /// An `if` branch always leaves exactly one value.
    fn compile_branch(&mut self, statements: &[Stmt]) -> CompileResult<()> {
        let start = self.current_instructions().len();
        self.compile_block(statements)?;
        let ends_in_pop = self
            .scope()
            .last
            .is_some_and(|last| last.discards_result && last.position >= start);
        if ends_in_pop {
            self.remove_last_pop();
        } else {
            self.emit(OpCode::Null, &[])?;
        }
        Ok(())
    }

    // ===== Symbols =====

    fn load_symbol(&mut self, symbol: &Symbol) -> CompileResult<usize> {
        let op = match symbol.scope {
            SymbolScope::Global => OpCode::GetGlobal,
            SymbolScope::Local => OpCode::GetLocal,
            SymbolScope::Free => OpCode::GetFree,
            SymbolScope::Builtin => OpCode::GetBuiltin,
        };
        self.emit(op, &[symbol.index])
    }

    fn store_symbol(&mut self, symbol: &Symbol, span: Span) -> CompileResult<()> {
        let op = match symbol.scope {
            SymbolScope::Global => OpCode::SetGlobal,
            SymbolScope::Local => OpCode::SetLocal,
            SymbolScope::Free => OpCode::SetFree,
            SymbolScope::Builtin => {
                return Err(CompileError::InvalidAssignment(symbol.name.clone(), span))
            }
        };
        self.emit(op, &[symbol.index])?;
        Ok(())
    }

    // ===== Scopes =====

    fn enter_scope(&mut self) {
        self.scopes.push(CompilationScope::default());
        let outer = std::mem::take(&mut self.symbols);
        self.symbols = SymbolTable::new_enclosed(outer);
    }

    /// Returns the scope's instructions, captured symbols and local count.
    fn leave_scope(&mut self) -> (Vec<u8>, Vec<Symbol>, usize) {
        let scope = self.scopes.pop().unwrap_or_default();
        let inner = std::mem::take(&mut self.symbols);
        let free_symbols = inner.free_symbols().to_vec();
        let num_locals = inner.num_definitions();
        self.symbols = inner.into_outer().unwrap_or_default();
        (scope.instructions, free_symbols, num_locals)
    }

    /// Load each captured symbol in capture order, then build the closure.
    fn emit_closure(
        &mut self,
        function: CompiledFunction,
        free_symbols: &[Symbol],
    ) -> CompileResult<()> {
        for symbol in free_symbols {
            self.load_symbol(symbol)?;
        }
        let index = self.add_constant(Value::Function(Rc::new(function)))?;
        self.emit(OpCode::Closure, &[index, free_symbols.len()])?;
        Ok(())
    }

    // ===== Emission =====

    fn scope(&self) -> &CompilationScope {
        &self.scopes[self.scopes.len() - 1]
    }

    fn scope_mut(&mut self) -> &mut CompilationScope {
        let last = self.scopes.len() - 1;
        &mut self.scopes[last]
    }

    fn current_instructions(&self) -> &[u8] {
        &self.scope().instructions
    }

    /// Add a constant, reusing an equal entry. Returns its index.
    fn add_constant(&mut self, value: Value) -> CompileResult<usize> {
        if let Some(index) = self.constants.iter().position(|c| c.same_constant(&value)) {
            return Ok(index);
        }
        if self.constants.len() > MAX_CONSTANTS {
            return Err(CompileError::TooManyConstants);
        }
        self.constants.push(value);
        Ok(self.constants.len() - 1)
    }

    fn emit_constant(&mut self, value: Value) -> CompileResult<()> {
        let index = self.add_constant(value)?;
        self.emit(OpCode::Constant, &[index])?;
        Ok(())
    }

    /// Emit an instruction and return its position.
    fn emit(&mut self, op: OpCode, operands: &[usize]) -> CompileResult<usize> {
        let instruction = make(op, operands)?;
        let scope = self.scope_mut();
        let position = scope.instructions.len();
        scope.instructions.extend_from_slice(&instruction);
        scope.previous = scope.last;
        scope.last = Some(EmittedInstruction {
            opcode: op,
            position,
            discards_result: false,
        });
        Ok(position)
    }

    fn last_instruction_is(&self, op: OpCode) -> bool {
        self.scope().last.is_some_and(|last| last.opcode == op)
    }

    /// Whether the body ended in an expression statement.
    fn last_discards_result(&self) -> bool {
        self.scope().last.is_some_and(|last| last.discards_result)
    }

    fn remove_last_pop(&mut self) {
        let scope = self.scope_mut();
        if let Some(last) = scope.last {
            scope.instructions.truncate(last.position);
            scope.last = scope.previous;
        }
    }

    fn replace_last_pop_with_return(&mut self) {
        let scope = self.scope_mut();
        if let Some(last) = scope.last.as_mut() {
            scope.instructions[last.position] = OpCode::ReturnValue.into();
            last.opcode = OpCode::ReturnValue;
            last.discards_result = false;
        }
    }

    /// Patch the operand of the instruction at `position`.
    fn change_operand(&mut self, position: usize, operand: usize) -> CompileResult<()> {
        let scope = self.scope_mut();
        let op = OpCode::from_u8(scope.instructions[position]).unwrap_or(OpCode::Jump);
        let instruction = make(op, &[operand])?;
        scope.instructions[position..position + instruction.len()].copy_from_slice(&instruction);
        Ok(())
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::ModuleRegistry;
    use crate::value::Object;
    use pretty_assertions::assert_eq;

    fn compile_program(program: Program) -> CompileResult<Chunk> {
        let mut compiler = Compiler::new();
        compiler.compile(&program)?;
        Ok(compiler.bytecode())
    }

    fn compile(statements: Vec<Stmt>) -> Chunk {
        compile_program(Program::new(statements)).expect("compiles")
    }

    fn compile_err(statements: Vec<Stmt>) -> CompileError {
        match compile_program(Program::new(statements)) {
            Ok(_) => panic!("expected a compile error"),
            Err(err) => err,
        }
    }

    fn code(instructions: &[(OpCode, &[usize])]) -> Vec<u8> {
        instructions
            .iter()
            .flat_map(|(op, operands)| make(*op, operands).unwrap())
            .collect()
    }

    fn function_constant(chunk: &Chunk, index: usize) -> Rc<CompiledFunction> {
        match &chunk.constants[index] {
            Value::Function(f) => f.clone(),
            other => panic!("constant {} is {}", index, other.inspect()),
        }
    }

    fn int(n: i64) -> Expr {
        Expr::int(n)
    }

    #[test]
    fn test_arithmetic() {
        let chunk = compile(vec![Stmt::expr(Expr::infix(int(1), "+", int(2)))]);
        assert_eq!(
            chunk.instructions,
            code(&[
                (OpCode::Constant, &[0]),
                (OpCode::Constant, &[1]),
                (OpCode::Add, &[]),
                (OpCode::Pop, &[]),
            ])
        );
        assert_eq!(chunk.constants, vec![Value::Integer(1), Value::Integer(2)]);
    }

    #[test]
    fn test_less_than_swaps_operands() {
        let chunk = compile(vec![Stmt::expr(Expr::infix(int(1), "<", int(2)))]);
        assert_eq!(
            chunk.instructions,
            code(&[
                (OpCode::Constant, &[0]),
                (OpCode::Constant, &[1]),
                (OpCode::Greater, &[]),
                (OpCode::Pop, &[]),
            ])
        );
        assert_eq!(chunk.constants, vec![Value::Integer(2), Value::Integer(1)]);
    }

    #[test]
    fn test_prefix() {
        let chunk = compile(vec![
            Stmt::expr(Expr::prefix("-", int(1))),
            Stmt::expr(Expr::prefix("!", Expr::boolean(true))),
        ]);
        assert_eq!(
            chunk.instructions,
            code(&[
                (OpCode::Constant, &[0]),
                (OpCode::Negate, &[]),
                (OpCode::Pop, &[]),
                (OpCode::True, &[]),
                (OpCode::Not, &[]),
                (OpCode::Pop, &[]),
            ])
        );
    }

    #[test]
    fn test_conditional_without_else() {
        let chunk = compile(vec![
            Stmt::expr(Expr::if_(
                Expr::boolean(true),
                vec![Stmt::expr(int(10))],
                None,
            )),
            Stmt::expr(int(3333)),
        ]);
        assert_eq!(
            chunk.instructions,
            code(&[
                (OpCode::True, &[]),            // 0000
                (OpCode::JumpIfFalse, &[10]),   // 0001
                (OpCode::Constant, &[0]),       // 0004
                (OpCode::Jump, &[11]),          // 0007
                (OpCode::Null, &[]),            // 0010
                (OpCode::Pop, &[]),             // 0011
                (OpCode::Constant, &[1]),       // 0012
                (OpCode::Pop, &[]),             // 0015
            ])
        );
    }

    #[test]
    fn test_empty_branch_pushes_null() {
        let chunk = compile(vec![Stmt::expr(Expr::if_(
            Expr::boolean(false),
            vec![],
            Some(vec![Stmt::expr(int(2))]),
        ))]);
        assert_eq!(
            chunk.instructions,
            code(&[
                (OpCode::False, &[]),          // 0000
                (OpCode::JumpIfFalse, &[8]),   // 0001
                (OpCode::Null, &[]),           // 0004
                (OpCode::Jump, &[11]),         // 0005
                (OpCode::Constant, &[0]),      // 0008
                (OpCode::Pop, &[]),            // 0011
            ])
        );
    }

    #[test]
    fn test_loop() {
        // let a = 0; loop (a < 3) { a = a + 1 }
        let chunk = compile(vec![
            Stmt::let_("a", int(0)),
            Stmt::expr(Expr::loop_(
                Expr::infix(Expr::ident("a"), "<", int(3)),
                vec![Stmt::expr(Expr::assign(
                    Expr::ident("a"),
                    Expr::infix(Expr::ident("a"), "+", int(1)),
                ))],
            )),
        ]);
        assert_eq!(
            chunk.instructions,
            code(&[
                (OpCode::Constant, &[0]),       // 0000
                (OpCode::SetGlobal, &[0]),      // 0003
                (OpCode::Pop, &[]),             // 0006
                (OpCode::Constant, &[1]),       // 0007
                (OpCode::GetGlobal, &[0]),      // 0010
                (OpCode::Greater, &[]),         // 0013
                (OpCode::JumpIfFalse, &[31]),   // 0014
                (OpCode::GetGlobal, &[0]),      // 0017
                (OpCode::Constant, &[2]),       // 0020
                (OpCode::Add, &[]),             // 0023
                (OpCode::SetGlobal, &[0]),      // 0024
                (OpCode::Pop, &[]),             // 0027
                (OpCode::Jump, &[7]),           // 0028
                (OpCode::Null, &[]),            // 0031
                (OpCode::Pop, &[]),             // 0032
            ])
        );
    }

    #[test]
    fn test_global_let() {
        let chunk = compile(vec![
            Stmt::let_("one", int(1)),
            Stmt::let_("two", Expr::ident("one")),
        ]);
        assert_eq!(
            chunk.instructions,
            code(&[
                (OpCode::Constant, &[0]),
                (OpCode::SetGlobal, &[0]),
                (OpCode::Pop, &[]),
                (OpCode::GetGlobal, &[0]),
                (OpCode::SetGlobal, &[1]),
                (OpCode::Pop, &[]),
            ])
        );
    }

    #[test]
    fn test_assignment_reuses_existing_binding() {
        let chunk = compile(vec![
            Stmt::let_("a", int(1)),
            Stmt::expr(Expr::assign(Expr::ident("a"), int(2))),
            Stmt::expr(Expr::assign(Expr::ident("b"), int(3))),
        ]);
        assert_eq!(
            chunk.instructions,
            code(&[
                (OpCode::Constant, &[0]),
                (OpCode::SetGlobal, &[0]),
                (OpCode::Pop, &[]),
                (OpCode::Constant, &[1]),
                (OpCode::SetGlobal, &[0]),
                (OpCode::Pop, &[]),
                (OpCode::Constant, &[2]),
                (OpCode::SetGlobal, &[1]),
                (OpCode::Pop, &[]),
            ])
        );
    }

    #[test]
    fn test_builtins() {
        let chunk = compile(vec![Stmt::expr(Expr::call(
            Expr::ident("len"),
            vec![Expr::array(vec![])],
        ))]);
        assert_eq!(
            chunk.instructions,
            code(&[
                (OpCode::GetBuiltin, &[0]),
                (OpCode::BuildArray, &[0]),
                (OpCode::Call, &[1]),
                (OpCode::Pop, &[]),
            ])
        );
    }

    #[test]
    fn test_function_with_implicit_return() {
        let chunk = compile(vec![Stmt::expr(Expr::function(
            &[],
            vec![Stmt::expr(Expr::infix(int(5), "+", int(10)))],
        ))]);
        let function = function_constant(&chunk, 2);
        assert_eq!(
            function.instructions,
            code(&[
                (OpCode::Constant, &[0]),
                (OpCode::Constant, &[1]),
                (OpCode::Add, &[]),
                (OpCode::ReturnValue, &[]),
            ])
        );
        assert_eq!(
            chunk.instructions,
            code(&[(OpCode::Closure, &[2, 0]), (OpCode::Pop, &[])])
        );
    }

    #[test]
    fn test_empty_function_returns() {
        let chunk = compile(vec![Stmt::expr(Expr::function(&[], vec![]))]);
        let function = function_constant(&chunk, 0);
        assert_eq!(function.instructions, code(&[(OpCode::Return, &[])]));
        assert_eq!(function.num_locals, 0);
    }

    #[test]
    fn test_closures_capture_in_order() {
        // fn(a) { fn(b) { a + b } }
        let chunk = compile(vec![Stmt::expr(Expr::function(
            &["a"],
            vec![Stmt::expr(Expr::function(
                &["b"],
                vec![Stmt::expr(Expr::infix(
                    Expr::ident("a"),
                    "+",
                    Expr::ident("b"),
                ))],
            ))],
        ))]);

        let inner = function_constant(&chunk, 0);
        assert_eq!(
            inner.instructions,
            code(&[
                (OpCode::GetFree, &[0]),
                (OpCode::GetLocal, &[0]),
                (OpCode::Add, &[]),
                (OpCode::ReturnValue, &[]),
            ])
        );
        assert_eq!((inner.num_locals, inner.num_parameters), (1, 1));

        let outer = function_constant(&chunk, 1);
        assert_eq!(
            outer.instructions,
            code(&[
                (OpCode::GetLocal, &[0]),
                (OpCode::Closure, &[0, 1]),
                (OpCode::ReturnValue, &[]),
            ])
        );
        assert_eq!(
            chunk.instructions,
            code(&[(OpCode::Closure, &[1, 0]), (OpCode::Pop, &[])])
        );
    }

    #[test]
    fn test_assignment_to_captured_variable() {
        // fn() { let a = 1; fn() { a = 2 } }
        let chunk = compile(vec![Stmt::expr(Expr::function(
            &[],
            vec![
                Stmt::let_("a", int(1)),
                Stmt::expr(Expr::function(
                    &[],
                    vec![Stmt::expr(Expr::assign(Expr::ident("a"), int(2)))],
                )),
            ],
        ))]);
        let inner = function_constant(&chunk, 2);
        assert_eq!(
            inner.instructions,
            code(&[
                (OpCode::Constant, &[1]),
                (OpCode::SetFree, &[0]),
                (OpCode::ReturnValue, &[]),
            ])
        );
    }

    #[test]
    fn test_hash_keys_sorted() {
        let chunk = compile(vec![Stmt::expr(Expr::hash(vec![
            (Expr::string("b"), int(1)),
            (Expr::ident("a"), int(2)),
        ]))]);
        assert_eq!(
            chunk.instructions,
            code(&[
                (OpCode::Constant, &[0]),
                (OpCode::Constant, &[1]),
                (OpCode::Constant, &[2]),
                (OpCode::Constant, &[3]),
                (OpCode::BuildHash, &[4]),
                (OpCode::Pop, &[]),
            ])
        );
        assert_eq!(
            chunk.constants,
            vec![
                Value::string("a"),
                Value::Integer(2),
                Value::string("b"),
                Value::Integer(1),
            ]
        );
    }

    #[test]
    fn test_compilation_is_deterministic() {
        let program = || {
            Program::new(vec![
                Stmt::let_(
                    "h",
                    Expr::hash(vec![
                        (Expr::string("z"), int(1)),
                        (Expr::string("m"), Expr::float(2.5)),
                        (Expr::string("a"), int(1)),
                    ]),
                ),
                Stmt::expr(Expr::index(Expr::ident("h"), Expr::string("m"))),
            ])
        };
        let first = compile_program(program()).unwrap();
        let second = compile_program(program()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_constants_deduplicated_by_kind() {
        let chunk = compile(vec![
            Stmt::expr(int(1)),
            Stmt::expr(Expr::float(1.0)),
            Stmt::expr(int(1)),
            Stmt::expr(Expr::string("x")),
            Stmt::expr(Expr::string("x")),
        ]);
        assert_eq!(
            chunk.constants,
            vec![Value::Integer(1), Value::Float(1.0), Value::string("x")]
        );
    }

    #[test]
    fn test_index_and_slice_operands() {
        // xs[1:]
        let chunk = compile(vec![
            Stmt::let_("xs", Expr::array(vec![])),
            Stmt::expr(Expr::slice(Expr::ident("xs"), Some(int(1)), None, None)),
        ]);
        assert_eq!(
            chunk.instructions,
            code(&[
                (OpCode::BuildArray, &[0]),
                (OpCode::SetGlobal, &[0]),
                (OpCode::Pop, &[]),
                (OpCode::GetGlobal, &[0]),
                (OpCode::Constant, &[0]),
                (OpCode::Null, &[]),
                (OpCode::Constant, &[1]),
                (OpCode::Constant, &[0]),
                (OpCode::Constant, &[2]),
                (OpCode::Index, &[]),
                (OpCode::Pop, &[]),
            ])
        );
        assert_eq!(
            chunk.constants,
            vec![Value::Integer(1), Value::Boolean(true), Value::Boolean(false)]
        );
    }

    #[test]
    fn test_index_assignment_pushes_value_first() {
        let chunk = compile(vec![
            Stmt::let_("xs", Expr::array(vec![])),
            Stmt::expr(Expr::assign(Expr::index(Expr::ident("xs"), int(0)), int(9))),
        ]);
        assert_eq!(
            &chunk.instructions[7..],
            code(&[
                (OpCode::Constant, &[0]),
                (OpCode::GetGlobal, &[0]),
                (OpCode::Constant, &[1]),
                (OpCode::Null, &[]),
                (OpCode::Constant, &[2]),
                (OpCode::Constant, &[3]),
                (OpCode::Constant, &[2]),
                (OpCode::IndexSet, &[]),
                (OpCode::Pop, &[]),
            ])
            .as_slice()
        );
        assert_eq!(
            chunk.constants,
            vec![
                Value::Integer(9),
                Value::Integer(0),
                Value::Boolean(false),
                Value::Integer(1),
            ]
        );
    }

    #[test]
    fn test_member_access_and_assignment() {
        let chunk = compile(vec![
            Stmt::let_("h", Expr::hash(vec![])),
            Stmt::expr(Expr::member(Expr::ident("h"), "k")),
            Stmt::expr(Expr::assign(Expr::member(Expr::ident("h"), "k"), int(1))),
        ]);
        assert_eq!(
            &chunk.instructions[7..],
            code(&[
                (OpCode::GetGlobal, &[0]),
                (OpCode::Constant, &[0]),
                (OpCode::GetMember, &[]),
                (OpCode::Pop, &[]),
                (OpCode::Constant, &[1]),
                (OpCode::Constant, &[0]),
                (OpCode::GetGlobal, &[0]),
                (OpCode::SetMember, &[]),
                (OpCode::Pop, &[]),
            ])
            .as_slice()
        );
    }

    #[test]
    fn test_scope_block() {
        // let x = 1; scope s { let y = x; export y; }
        let chunk = compile(vec![
            Stmt::let_("x", int(1)),
            Stmt::scope(
                "s",
                vec![Stmt::let_("y", Expr::ident("x")), Stmt::export("y")],
            ),
        ]);
        let body = function_constant(&chunk, 2);
        assert_eq!(body.name.as_deref(), Some("s"));
        assert_eq!(
            body.instructions,
            code(&[
                (OpCode::GetGlobal, &[0]),
                (OpCode::SetLocal, &[0]),
                (OpCode::Pop, &[]),
                (OpCode::Constant, &[1]),
                (OpCode::GetLocal, &[0]),
                (OpCode::Export, &[]),
                (OpCode::Scope, &[]),
                (OpCode::ReturnValue, &[]),
            ])
        );
        assert_eq!(
            &chunk.instructions[7..],
            code(&[
                (OpCode::Closure, &[2, 0]),
                (OpCode::Call, &[0]),
                (OpCode::SetGlobal, &[1]),
                (OpCode::Pop, &[]),
            ])
            .as_slice()
        );
    }

    #[test]
    fn test_scope_block_loads_captures() {
        // fn(a) { scope s { export a; } }
        let chunk = compile(vec![Stmt::expr(Expr::function(
            &["a"],
            vec![Stmt::scope("s", vec![Stmt::export("a")])],
        ))]);
        let outer = function_constant(&chunk, 2);
        assert_eq!(
            outer.instructions,
            code(&[
                (OpCode::GetLocal, &[0]),
                (OpCode::Closure, &[1, 1]),
                (OpCode::Call, &[0]),
                (OpCode::SetLocal, &[1]),
                (OpCode::Pop, &[]),
                (OpCode::Return, &[]),
            ])
        );
    }

    #[test]
    fn test_trailing_let_is_not_the_return_value() {
        // fn() { let a = 5 }
        let chunk = compile(vec![Stmt::expr(Expr::function(
            &[],
            vec![Stmt::let_("a", int(5))],
        ))]);
        let function = function_constant(&chunk, 1);
        assert_eq!(
            function.instructions,
            code(&[
                (OpCode::Constant, &[0]),
                (OpCode::SetLocal, &[0]),
                (OpCode::Pop, &[]),
                (OpCode::Return, &[]),
            ])
        );

        // if (true) { let b = 1 }
        let chunk = compile(vec![Stmt::expr(Expr::if_(
            Expr::boolean(true),
            vec![Stmt::let_("b", int(1))],
            None,
        ))]);
        assert_eq!(
            chunk.instructions,
            code(&[
                (OpCode::True, &[]),
                (OpCode::JumpIfFalse, &[15]),
                (OpCode::Constant, &[0]),
                (OpCode::SetGlobal, &[0]),
                (OpCode::Pop, &[]),
                (OpCode::Null, &[]),
                (OpCode::Jump, &[16]),
                (OpCode::Null, &[]),
                (OpCode::Pop, &[]),
            ])
        );
    }

    #[test]
    fn test_load_static_module() {
        let chunk = compile(vec![
            Stmt::load("math"),
            Stmt::expr(Expr::resolve(Expr::ident("math"), "PI")),
        ]);
        assert_eq!(
            chunk.instructions,
            code(&[
                (OpCode::Constant, &[0]),
                (OpCode::SetGlobal, &[0]),
                (OpCode::Pop, &[]),
                (OpCode::GetGlobal, &[0]),
                (OpCode::Constant, &[1]),
                (OpCode::ScopeResolve, &[]),
                (OpCode::Pop, &[]),
            ])
        );
        let expected = ModuleRegistry::default().instantiate("math").unwrap();
        assert_eq!(chunk.constants[0], Value::Scope(Rc::new(expected)));
    }

    #[test]
    fn test_errors() {
        let err = compile_err(vec![Stmt::expr(Expr::ident("nope"))]);
        assert!(matches!(err, CompileError::UndefinedVariable(name, _) if name == "nope"));

        let err = compile_err(vec![Stmt::expr(Expr::infix(int(1), "^", int(2)))]);
        assert!(matches!(err, CompileError::UnknownOperator(op, _) if op == "^"));

        let err = compile_err(vec![Stmt::expr(Expr::prefix("~", int(2)))]);
        assert!(matches!(err, CompileError::UnknownOperator(op, _) if op == "~"));

        let err = compile_err(vec![Stmt::expr(
            Expr::assign(Expr::ident("len"), int(2)).with_span(Span::new(4, 2)),
        )]);
        assert!(matches!(
            err,
            CompileError::InvalidAssignment(name, span) if name == "len" && span == Span::new(4, 2)
        ));

        let err = compile_err(vec![Stmt::load("missing").with_span(Span::new(3, 1))]);
        assert_eq!(err.to_string(), "module not found: [missing] at 3:1");

        let err = compile_err(vec![Stmt::export("ghost")]);
        assert!(matches!(err, CompileError::UndefinedVariable(name, _) if name == "ghost"));
    }

    #[test]
    fn test_resumed_compiler_shares_state() {
        let mut first = Compiler::new();
        first
            .compile(&Program::new(vec![Stmt::let_("a", int(7))]))
            .unwrap();
        let (symbols, constants) = first.into_state();

        let mut second = Compiler::with_state(symbols, constants);
        second
            .compile(&Program::new(vec![Stmt::expr(Expr::ident("a"))]))
            .unwrap();
        let chunk = second.bytecode();
        assert_eq!(
            chunk.instructions,
            code(&[(OpCode::GetGlobal, &[0]), (OpCode::Pop, &[])])
        );
        assert_eq!(chunk.constants, vec![Value::Integer(7)]);
    }
}
