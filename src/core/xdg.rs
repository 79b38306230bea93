//! Config, data and cache locations.
//!
//! Resolves where Doca keeps its config file, collections and the
//! downloaded embedding models on Linux/Unix systems.

use std::env;
use std::fs;
use std::path::PathBuf;

/// XDG directory structure for Doca
///
/// Explicit `DOCA_*` variables win over `XDG_*` variables, which win
/// over the XDG defaults under the home directory.
#[derive(Debug, Clone)]
pub struct XdgDirs {
    pub config_dir: PathBuf,
    pub data_dir: PathBuf,
    pub cache_dir: PathBuf,
}

impl XdgDirs {
    /// Resolve all three directories from the current environment
    pub fn new() -> Self {
        Self {
            config_dir: Self::resolve("DOCA_CONFIG_DIR", "XDG_CONFIG_HOME", &[".config"]),
            data_dir: Self::resolve("DOCA_DATA_DIR", "XDG_DATA_HOME", &[".local", "share"]),
            cache_dir: Self::resolve("DOCA_CACHE_DIR", "XDG_CACHE_HOME", &[".cache"]),
        }
    }

    fn resolve(doca_var: &str, xdg_var: &str, default_parts: &[&str]) -> PathBuf {
        if let Ok(dir) = env::var(doca_var) {
            return PathBuf::from(dir);
        }

        if let Ok(xdg) = env::var(xdg_var) {
            return PathBuf::from(xdg).join("doca");
        }

        let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        for part in default_parts {
            path.push(part);
        }
        path.join("doca")
    }

    /// `DOCA_CONFIG_FILE`, else `config.toml` in the config dir
    pub fn config_file(&self) -> PathBuf {
        if let Ok(file) = env::var("DOCA_CONFIG_FILE") {
            return PathBuf::from(file);
        }

        self.config_dir.join("config.toml")
    }

    /// Directory holding one subdirectory per collection
    pub fn collections_dir(&self) -> PathBuf {
        self.data_dir.join("collections")
    }

    /// Download cache for embedding model files
    pub fn models_dir(&self) -> PathBuf {
        self.cache_dir.join("models")
    }

    /// Create the config, collections and models directories
    pub fn ensure_dirs_exist(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.config_dir)?;
        fs::create_dir_all(self.collections_dir())?;
        fs::create_dir_all(self.models_dir())?;
        Ok(())
    }

    pub fn log_paths(&self) {
        tracing::debug!("XDG directories resolved:");
        tracing::debug!("  Config file: {:?}", self.config_file());
        tracing::debug!("  Collections: {:?}", self.collections_dir());
        tracing::debug!("  Models: {:?}", self.models_dir());
    }
}

impl Default for XdgDirs {
    fn default() -> Self {
        Self::new()
    }
}
