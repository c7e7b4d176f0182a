//! Run context shared by successive compile/execute cycles.

use std::rc::Rc;

use tracing::debug;

use crate::ast::Program;
use crate::bytecode::{global_symbols, new_globals, Chunk, Compiler, Globals, SymbolTable, Vm};
use crate::config::VmConfig;
use crate::error::BriskError;
use crate::module::ModuleLoader;
use crate::value::Value;

/// Global symbols, constants and globals that outlive a single program.
///
/// Each [`Session::eval`] compiles against the accumulated state, so names
/// defined by one call are visible to the next.
#[derive(Debug)]
pub struct Session {
    symbols: SymbolTable,
    constants: Vec<Value>,
    globals: Globals,
    loader: Rc<ModuleLoader>,
    config: VmConfig,
}

impl Session {
    pub fn new() -> Self {
        Self::with_config(VmConfig::default())
    }

    pub fn with_config(config: VmConfig) -> Self {
        Self {
            symbols: global_symbols(),
            constants: Vec::new(),
            globals: new_globals(config.globals_size),
            loader: Rc::new(ModuleLoader::from_env()),
            config,
        }
    }

    pub fn with_loader(mut self, loader: ModuleLoader) -> Self {
        self.loader = Rc::new(loader);
        self
    }

    pub fn globals(&self) -> &Globals {
        &self.globals
    }

    /// Compile against the session state.
    ///
    /// The symbol table and constant pool are only updated when the whole
    /// unit compiles.
    pub fn compile(&mut self, program: &Program) -> Result<Chunk, BriskError> {
        let mut compiler = Compiler::with_state(self.symbols.clone(), self.constants.clone())
            .with_loader(self.loader.clone());
        compiler.compile(program)?;

        let chunk = compiler.bytecode();
        let (symbols, constants) = compiler.into_state();
        self.symbols = symbols;
        self.constants = constants;
        Ok(chunk)
    }

    /// Execute a chunk against the session globals, returning the last
    /// popped value.
    pub fn run(&mut self, chunk: Chunk) -> Result<Value, BriskError> {
        let mut vm = Vm::with_globals(chunk, self.globals.clone(), self.config.clone());
        vm.run()?;
        Ok(vm.last_popped_stack_elem())
    }

    pub fn eval(&mut self, program: &Program) -> Result<Value, BriskError> {
        let chunk = self.compile(program)?;
        debug!(
            bytes = chunk.instructions.len(),
            constants = chunk.constants.len(),
            "evaluating"
        );
        self.run(chunk)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
