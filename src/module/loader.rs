//! Compile-time resolution of `load` statements.
//!
//! First match wins:
//! 1. a module in the [`ModuleRegistry`]
//! 2. a native library `<name>.<dll ext>` handed to the [`NativeLoader`]
//! 3. a source file `<name>.bk` parsed by the [`Frontend`]

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tracing::debug;

use crate::ast::Program;
use crate::config::LoaderConfig;
use crate::module::registry::ModuleRegistry;
use crate::value::Scope;

/// Turns module source text into a syntax tree.
pub trait Frontend {
    fn parse(&self, name: &str, source: &str) -> Result<Program, String>;
}

/// Binds a native library and calls its module factory.
pub trait NativeLoader {
    fn load(&self, name: &str, path: &Path) -> Result<Scope, String>;
}

/// A successfully resolved module.
#[derive(Debug)]
pub enum LoadedModule {
    /// Static or native module: bound as one Scope value
    Scope(Scope),
    /// Source module: compiled inline into the importing unit
    Source { path: PathBuf, program: Program },
}

/// Resolves module names for the compiler.
#[derive(Clone, Default)]
pub struct ModuleLoader {
    registry: ModuleRegistry,
    config: LoaderConfig,
    frontend: Option<Rc<dyn Frontend>>,
    native: Option<Rc<dyn NativeLoader>>,
}

impl ModuleLoader {
    pub fn new(registry: ModuleRegistry, config: LoaderConfig) -> Self {
        Self {
            registry,
            config,
            frontend: None,
            native: None,
        }
    }

    /// Default registry, searching the working directory and `BRISK_PATH`.
    pub fn from_env() -> Self {
        Self::new(ModuleRegistry::default(), LoaderConfig::from_env())
    }

    pub fn with_frontend(mut self, frontend: Rc<dyn Frontend>) -> Self {
        self.frontend = Some(frontend);
        self
    }

    pub fn with_native_loader(mut self, native: Rc<dyn NativeLoader>) -> Self {
        self.native = Some(native);
        self
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ModuleRegistry {
        &mut self.registry
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Resolve `name`. `Ok(None)` means no tier knows the module.
    pub fn load(&self, name: &str) -> Result<Option<LoadedModule>, String> {
        if let Some(scope) = self.registry.instantiate(name) {
            debug!(module = name, tier = "static", "module resolved");
            return Ok(Some(LoadedModule::Scope(scope)));
        }

        if let Some(path) = self.locate(name, &self.config.native_extension) {
            debug!(module = name, tier = "native", path = %path.display(), "module resolved");
            let native = self
                .native
                .as_ref()
                .ok_or_else(|| format!("no native loader configured for {}", path.display()))?;
            let mut scope = native.load(name, &path)?;
            scope.name = name.to_string();
            return Ok(Some(LoadedModule::Scope(scope)));
        }

        if let Some(path) = self.locate(name, &self.config.source_extension) {
            debug!(module = name, tier = "source", path = %path.display(), "module resolved");
            let frontend = self
                .frontend
                .as_ref()
                .ok_or_else(|| format!("no frontend configured for {}", path.display()))?;
            let source = fs::read_to_string(&path)
                .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
            let program = frontend.parse(name, &source)?;
            return Ok(Some(LoadedModule::Source { path, program }));
        }

        debug!(module = name, "module not found");
        Ok(None)
    }

    fn locate(&self, name: &str, extension: &str) -> Option<PathBuf> {
        if extension.is_empty() {
            return None;
        }
        let file_name = format!("{}.{}", name, extension);
        self.config
            .search_path
            .iter()
            .map(|dir| dir.join(&file_name))
            .find(|candidate| candidate.is_file())
    }
}

impl fmt::Debug for ModuleLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleLoader")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .field("frontend", &self.frontend.is_some())
            .field("native", &self.native.is_some())
            .finish()
    }
}
