//! Dispatcher configuration.
//!
//! A [`DispatchConfig`] describes where backends and legacy plugins live and
//! how sessions behave at teardown. It is plain data: building one loads
//! nothing. [`crate::context::DispatchContext::from_config`] turns it into
//! catalog sources.
//!
//! # Example
//!
//! ```rust,ignore
//! use mxdispatch::config::DispatchConfig;
//! use mxdispatch::abi::ImplKind;
//!
//! let config = DispatchConfig::from_env()
//!     .with_backend_dir("/opt/vendor/lib", ImplKind::Hardware, -20)
//!     .with_drain_buffer_size(4 << 20);
//! ```

use crate::abi::{ImplKind, InterfaceFlags, PluginUid, Priority};
use crate::observability::TracingConfig;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Initial size of the scratch bitstream used to drain encoders at close.
pub const DEFAULT_DRAIN_BUFFER_SIZE: usize = 1 << 20;

/// Upper bound the drain scratch buffer may grow to.
pub const DEFAULT_MAX_DRAIN_BUFFER_SIZE: usize = 256 << 20;

/// Priority of `/usr/local/lib/mxdispatch/<kind>`.
pub const LOCAL_DIR_PRIORITY: i32 = 0;

/// Priority of `/usr/lib/mxdispatch/<kind>`.
pub const SYSTEM_DIR_PRIORITY: i32 = 10;

/// Priority of directories listed in the environment.
pub const ENV_DIR_PRIORITY: i32 = -10;

/// A directory of backends of one kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendDir {
    /// Directory to scan.
    pub path: PathBuf,
    /// Kind of every backend in the directory.
    pub kind: ImplKind,
    /// Interfaces the backends declare; empty when unknown.
    pub interfaces: InterfaceFlags,
    /// Catalog priority; lower is tried first.
    pub priority: i32,
}

/// Configuration for a dispatch context.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Backend directories.
    pub backend_dirs: Vec<BackendDir>,
    /// Known legacy plugin modules.
    pub plugins: Vec<(PluginUid, PathBuf)>,
    /// Priority hint pushed to backends at init.
    pub priority: Priority,
    /// Initial size of the drain scratch buffer, in bytes.
    pub drain_buffer_size: usize,
    /// Largest size the drain scratch buffer may grow to, in bytes.
    pub max_drain_buffer_size: usize,
    /// Span configuration.
    pub tracing: TracingConfig,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            backend_dirs: Vec::new(),
            plugins: Vec::new(),
            priority: Priority::NORMAL,
            drain_buffer_size: DEFAULT_DRAIN_BUFFER_SIZE,
            max_drain_buffer_size: DEFAULT_MAX_DRAIN_BUFFER_SIZE,
            tracing: TracingConfig::default(),
        }
    }
}

impl DispatchConfig {
    /// The standard system directories for every kind.
    pub fn system() -> Self {
        let mut config = Self::default();
        for kind in ImplKind::ALL {
            config = config
                .with_backend_dir(
                    Path::new("/usr/local/lib/mxdispatch").join(kind.as_str()),
                    kind,
                    LOCAL_DIR_PRIORITY,
                )
                .with_backend_dir(
                    Path::new("/usr/lib/mxdispatch").join(kind.as_str()),
                    kind,
                    SYSTEM_DIR_PRIORITY,
                );
        }
        config
    }

    /// System directories plus the `MXDISPATCH_*_PATH` environment lists.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var_os(name))
    }

    /// Like [`DispatchConfig::from_env`], reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<OsString>) -> Self {
        let mut config = Self::system();
        for kind in ImplKind::ALL {
            let var = env_var(kind);
            let Some(value) = lookup(var) else {
                continue;
            };
            for path in std::env::split_paths(&value) {
                if path.as_os_str().is_empty() {
                    continue;
                }
                tracing::debug!(var, path = %path.display(), "backend directory from environment");
                config = config.with_backend_dir(path, kind, ENV_DIR_PRIORITY);
            }
        }
        config
    }

    /// Add a backend directory.
    pub fn with_backend_dir(mut self, path: impl Into<PathBuf>, kind: ImplKind, priority: i32) -> Self {
        self.backend_dirs.push(BackendDir {
            path: path.into(),
            kind,
            interfaces: InterfaceFlags::empty(),
            priority,
        });
        self
    }

    /// Add a backend directory with declared interfaces.
    pub fn with_backend_dir_interfaces(mut self, dir: BackendDir) -> Self {
        self.backend_dirs.push(dir);
        self
    }

    /// Register a legacy plugin module.
    pub fn with_plugin(mut self, uid: PluginUid, path: impl Into<PathBuf>) -> Self {
        self.plugins.push((uid, path.into()));
        self
    }

    /// Set the priority hint.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the initial drain scratch buffer size.
    pub fn with_drain_buffer_size(mut self, size: usize) -> Self {
        self.drain_buffer_size = size;
        self
    }

    /// Set the drain scratch buffer limit.
    pub fn with_max_drain_buffer_size(mut self, size: usize) -> Self {
        self.max_drain_buffer_size = size;
        self
    }

    /// Set the span configuration.
    pub fn with_tracing(mut self, tracing: TracingConfig) -> Self {
        self.tracing = tracing;
        self
    }
}

/// Environment variable listing extra directories for `kind`.
pub const fn env_var(kind: ImplKind) -> &'static str {
    match kind {
        ImplKind::Hardware => "MXDISPATCH_HARDWARE_PATH",
        ImplKind::Software => "MXDISPATCH_SOFTWARE_PATH",
        ImplKind::Pseudo => "MXDISPATCH_PSEUDO_PATH",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DispatchConfig::default();
        assert!(config.backend_dirs.is_empty());
        assert_eq!(config.priority, Priority::NORMAL);
        assert_eq!(config.drain_buffer_size, DEFAULT_DRAIN_BUFFER_SIZE);
        assert!(config.max_drain_buffer_size >= config.drain_buffer_size);
    }

    #[test]
    fn test_system_dirs() {
        let config = DispatchConfig::system();
        assert_eq!(config.backend_dirs.len(), 6);
        let hw: Vec<_> = config
            .backend_dirs
            .iter()
            .filter(|d| d.kind == ImplKind::Hardware)
            .collect();
        assert_eq!(hw[0].path, Path::new("/usr/local/lib/mxdispatch/hardware"));
        assert_eq!(hw[1].path, Path::new("/usr/lib/mxdispatch/hardware"));
        assert!(hw[0].priority < hw[1].priority);
    }

    #[test]
    fn test_env_dirs_take_precedence() {
        let joined = std::env::join_paths(["/opt/a", "/opt/b"]).unwrap();
        let config = DispatchConfig::from_lookup(|name| {
            (name == "MXDISPATCH_SOFTWARE_PATH").then(|| joined.clone())
        });

        let env: Vec<_> = config
            .backend_dirs
            .iter()
            .filter(|d| d.priority == ENV_DIR_PRIORITY)
            .collect();
        assert_eq!(env.len(), 2);
        assert!(env.iter().all(|d| d.kind == ImplKind::Software));
        assert_eq!(env[0].path, Path::new("/opt/a"));
    }

    #[test]
    fn test_builder() {
        let uid = PluginUid([7; 16]);
        let config = DispatchConfig::default()
            .with_plugin(uid, "/opt/plugins/libmx_plugin.so")
            .with_priority(Priority::HIGH)
            .with_drain_buffer_size(64)
            .with_max_drain_buffer_size(1024)
            .with_tracing(TracingConfig::none());

        assert_eq!(config.plugins[0].0, uid);
        assert_eq!(config.priority, Priority::HIGH);
        assert_eq!(config.drain_buffer_size, 64);
        assert_eq!(config.max_drain_buffer_size, 1024);
        assert!(!config.tracing.session_spans);
    }
}
