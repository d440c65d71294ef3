//! Implementation descriptors: one discovered backend candidate.

use crate::abi::{ImplKind, InterfaceFlags};
use crate::backend::{DynamicModule, LoadError, SymbolSource};
use crate::version::ApiVersion;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Where a backend or plugin module lives.
#[derive(Clone)]
pub struct Location(Inner);

#[derive(Clone)]
enum Inner {
    Library(PathBuf),
    Builtin(Arc<dyn SymbolSource>),
}

impl Location {
    /// A shared library on disk.
    ///
    /// # Safety
    ///
    /// The library is loaded (running its initializers) whenever this
    /// location is selected. It must be a trusted module whose exports match
    /// the signatures in [`crate::abi`].
    pub unsafe fn library(path: impl Into<PathBuf>) -> Self {
        Self(Inner::Library(path.into()))
    }

    /// An in-process module.
    pub fn builtin(module: impl SymbolSource + 'static) -> Self {
        Self(Inner::Builtin(Arc::new(module)))
    }

    /// An in-process module that is already shared.
    pub fn shared(module: Arc<dyn SymbolSource>) -> Self {
        Self(Inner::Builtin(module))
    }

    /// Library path, if this is a shared library.
    pub fn path(&self) -> Option<&Path> {
        match &self.0 {
            Inner::Library(path) => Some(path),
            Inner::Builtin(_) => None,
        }
    }

    /// Load the module.
    pub fn load(&self) -> Result<Arc<dyn SymbolSource>, LoadError> {
        match &self.0 {
            // SAFETY: library locations are only created through the unsafe
            // `Location::library`, whose caller vouched for the library.
            Inner::Library(path) => {
                let module: Arc<dyn SymbolSource> =
                    Arc::new(unsafe { DynamicModule::open(path) }?);
                Ok(module)
            }
            Inner::Builtin(module) => Ok(Arc::clone(module)),
        }
    }
}

impl fmt::Debug for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Inner::Library(path) => f.debug_tuple("Library").field(path).finish(),
            Inner::Builtin(module) => f.debug_tuple("Builtin").field(&module.name()).finish(),
        }
    }
}

/// A backend candidate produced by a catalog source.
#[derive(Debug, Clone)]
pub struct ImplDescriptor {
    name: String,
    location: Location,
    kind: ImplKind,
    interfaces: InterfaceFlags,
    version: Option<ApiVersion>,
}

impl ImplDescriptor {
    /// Describe a backend at `location`.
    pub fn new(name: impl Into<String>, location: Location, kind: ImplKind) -> Self {
        Self {
            name: name.into(),
            location,
            kind,
            interfaces: InterfaceFlags::empty(),
            version: None,
        }
    }

    /// Describe an in-process backend.
    pub fn builtin(module: impl SymbolSource + 'static, kind: ImplKind) -> Self {
        let name = module.name().to_string();
        Self::new(name, Location::builtin(module), kind)
    }

    /// Declare the interfaces the backend supports.
    pub fn with_interfaces(mut self, interfaces: InterfaceFlags) -> Self {
        self.interfaces = interfaces;
        self
    }

    /// Declare the API version the backend is known to provide.
    pub fn with_version(mut self, version: ApiVersion) -> Self {
        self.version = Some(version);
        self
    }

    /// Candidate name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Where the module lives.
    pub fn location(&self) -> &Location {
        &self.location
    }

    /// Implementation kind.
    pub fn kind(&self) -> ImplKind {
        self.kind
    }

    /// Declared interfaces; empty when the source does not know them.
    pub fn interfaces(&self) -> InterfaceFlags {
        self.interfaces
    }

    /// Version known before loading, if any.
    pub fn version(&self) -> Option<ApiVersion> {
        self.version
    }

    /// Whether this candidate may serve `requested` interfaces.
    ///
    /// Candidates without declared interfaces are kept; the backend decides
    /// at init.
    pub fn matches_interfaces(&self, requested: InterfaceFlags) -> bool {
        self.interfaces.is_empty() || self.interfaces.satisfies(requested)
    }

    /// Load the backend module.
    pub fn load(&self) -> Result<Arc<dyn SymbolSource>, LoadError> {
        self.location.load()
    }
}
