//! Runtime and module-loader configuration.

use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Environment variable holding extra module directories, colon-separated.
pub const SEARCH_PATH_ENV: &str = "BRISK_PATH";

/// Extension of source modules.
pub const SOURCE_EXTENSION: &str = "bk";

/// Capacities of a virtual machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmConfig {
    /// Operand stack slots
    pub stack_size: usize,
    /// Maximum number of active call frames
    pub max_frames: usize,
    /// Slots in the globals array
    pub globals_size: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            stack_size: 4096,
            max_frames: 2048,
            globals_size: 65536,
        }
    }
}

/// Where `load` looks for modules on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Directories searched in order
    pub search_path: Vec<PathBuf>,
    pub source_extension: String,
    pub native_extension: String,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        LoaderConfig {
            search_path: Vec::new(),
            source_extension: SOURCE_EXTENSION.to_string(),
            native_extension: env::consts::DLL_EXTENSION.to_string(),
        }
    }
}

impl LoaderConfig {
    /// The working directory followed by every entry of `BRISK_PATH`.
    pub fn from_env() -> Self {
        let mut search_path = Vec::new();
        if let Ok(cwd) = env::current_dir() {
            search_path.push(cwd);
        }
        if let Ok(paths) = env::var(SEARCH_PATH_ENV) {
            search_path.extend(split_search_path(&paths));
        }
        LoaderConfig {
            search_path,
            ..Self::default()
        }
    }

    pub fn with_search_path(mut self, dir: impl Into<PathBuf>) -> Self {
        self.search_path.push(dir.into());
        self
    }
}

fn split_search_path(paths: &str) -> impl Iterator<Item = PathBuf> + '_ {
    paths
        .split(':')
        .filter(|entry| !entry.is_empty())
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let vm = VmConfig::default();
        assert_eq!(vm.stack_size, 4096);
        assert_eq!(vm.max_frames, 2048);
        assert_eq!(vm.globals_size, 65536);

        let loader = LoaderConfig::default();
        assert_eq!(loader.source_extension, "bk");
        assert!(loader.search_path.is_empty());
    }

    #[test]
    fn test_split_search_path() {
        let dirs: Vec<PathBuf> = split_search_path("/a::/b/c:").collect();
        assert_eq!(dirs, vec![PathBuf::from("/a"), PathBuf::from("/b/c")]);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: VmConfig = serde_json::from_str(r#"{"max_frames": 16}"#).unwrap();
        assert_eq!(
            config,
            VmConfig {
                max_frames: 16,
                ..VmConfig::default()
            }
        );

        let loader: LoaderConfig =
            serde_json::from_str(r#"{"search_path": ["/opt/brisk"]}"#).unwrap();
        assert_eq!(loader.search_path, vec![PathBuf::from("/opt/brisk")]);
        assert_eq!(loader.source_extension, "bk");
    }
}
