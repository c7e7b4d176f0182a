//! Module system.
//!
//! This module provides:
//! - The static registry of in-process modules (`math` ships by default)
//! - Search-path lookup of native and source modules
//! - The host hooks that parse source modules and bind native libraries

mod loader;
pub mod math;
mod registry;

pub use loader::{Frontend, LoadedModule, ModuleLoader, NativeLoader};
pub use registry::{ModuleFactory, ModuleRegistry};
