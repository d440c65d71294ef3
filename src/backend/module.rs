//! Backend modules: where entry points come from.
//!
//! A backend is anything that can turn a stable symbol name into a code
//! address. Shared libraries are opened with `libloading`; in-process
//! backends register their entry points in a [`StaticModule`].

use crate::abi::RawEntry;
use libloading::{Library, Symbol};
use std::collections::HashMap;
use std::ffi::{CStr, CString, c_void};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur when loading a backend or plugin module.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// The shared library could not be opened.
    #[error("failed to load library '{}': {reason}", path.display())]
    Library {
        /// Path that was opened.
        path: PathBuf,
        /// Loader message.
        reason: String,
    },

    /// The module does not export an entry point the dispatcher requires.
    #[error("module '{module}' lacks required entry point '{symbol}'")]
    MissingEntryPoint {
        /// Module name.
        module: String,
        /// Missing symbol.
        symbol: &'static str,
    },
}

/// Resolves stable symbol names to entry points.
pub trait SymbolSource: Send + Sync {
    /// Human-readable module name for logs.
    fn name(&self) -> &str;

    /// Look up an exported symbol.
    fn resolve(&self, symbol: &CStr) -> Option<RawEntry>;
}

impl fmt::Debug for dyn SymbolSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SymbolSource")
            .field("name", &self.name())
            .finish()
    }
}

/// A backend loaded from a shared library.
///
/// The library stays mapped until this value is dropped.
pub struct DynamicModule {
    name: String,
    path: PathBuf,
    library: Library,
}

impl DynamicModule {
    /// Open a shared library.
    ///
    /// # Safety
    ///
    /// Loading a library runs its initializers. The library must be a
    /// trusted backend whose exports match the signatures in
    /// [`crate::abi`].
    pub unsafe fn open(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();

        // SAFETY: caller guarantees the library is a trusted backend.
        let library = unsafe { Library::new(path) }.map_err(|e| LoadError::Library {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        tracing::debug!(module = %name, path = %path.display(), "loaded backend library");

        Ok(Self {
            name,
            path: path.to_path_buf(),
            library,
        })
    }

    /// Path the library was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SymbolSource for DynamicModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn resolve(&self, symbol: &CStr) -> Option<RawEntry> {
        // SAFETY: only the symbol address is read here. It is cast to a
        // function type later, at the call site that knows the signature.
        let address: Symbol<'_, *const c_void> =
            unsafe { self.library.get(symbol.to_bytes_with_nul()) }.ok()?;
        RawEntry::new(*address)
    }
}

impl Drop for DynamicModule {
    fn drop(&mut self) {
        tracing::debug!(module = %self.name, "unloading backend library");
    }
}

impl fmt::Debug for DynamicModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicModule")
            .field("name", &self.name)
            .field("path", &self.path)
            .finish()
    }
}

/// An in-process backend with an explicit export list.
#[derive(Clone)]
pub struct StaticModule {
    name: String,
    exports: HashMap<CString, RawEntry>,
}

impl StaticModule {
    /// Create a module with no exports.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            exports: HashMap::new(),
        }
    }

    /// Export `entry` under `symbol`. Null entries are ignored.
    pub fn export(mut self, symbol: &CStr, entry: *const c_void) -> Self {
        if let Some(entry) = RawEntry::new(entry) {
            self.exports.insert(symbol.to_owned(), entry);
        }
        self
    }

    /// Drop an export, emulating an older or partial backend.
    pub fn without(mut self, symbol: &CStr) -> Self {
        self.exports.remove(symbol);
        self
    }

    /// Rename the module.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Number of exported symbols.
    pub fn len(&self) -> usize {
        self.exports.len()
    }

    /// Whether nothing is exported.
    pub fn is_empty(&self) -> bool {
        self.exports.is_empty()
    }
}

impl SymbolSource for StaticModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn resolve(&self, symbol: &CStr) -> Option<RawEntry> {
        self.exports.get(symbol).copied()
    }
}

impl fmt::Debug for StaticModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticModule")
            .field("name", &self.name)
            .field("exports", &self.exports.len())
            .finish()
    }
}
