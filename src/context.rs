//! Process-wide dispatch state shared by every session.

use crate::abi::{ImplKind, InterfaceFlags, PluginUid, Priority};
use crate::backend::pseudo;
use crate::catalog::{
    BuiltinSource, Candidates, CatalogSource, DirectorySource, ImplCatalog, ImplDescriptor,
    Location,
};
use crate::config::DispatchConfig;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};

/// Priority of the built-in pseudo backend: after everything else.
pub const PSEUDO_PRIORITY: i32 = i32::MAX;

/// Shared dispatcher state: the catalog, known plugins and the priority
/// hint.
///
/// Sessions hold an `Arc` to their context. Locks are only held while the
/// catalog is snapshotted or a plugin is looked up, never while a backend
/// is loaded or called.
pub struct DispatchContext {
    catalog: RwLock<ImplCatalog>,
    plugins: RwLock<HashMap<PluginUid, Location>>,
    priority: AtomicI32,
    next_session: AtomicU64,
    config: DispatchConfig,
}

impl DispatchContext {
    /// A context with an empty catalog and default settings.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::empty(DispatchConfig::default()))
    }

    /// A context whose only backend is the built-in pseudo backend.
    pub fn with_pseudo_backend() -> Arc<Self> {
        let context = Self::empty(DispatchConfig::default());
        context.add_source(
            PSEUDO_PRIORITY,
            BuiltinSource::new("builtin").with(
                ImplDescriptor::builtin(pseudo::pseudo_module(), ImplKind::Pseudo)
                    .with_interfaces(pseudo::INTERFACES),
            ),
        );
        Arc::new(context)
    }

    /// A context populated from `config`.
    ///
    /// # Safety
    ///
    /// Every library in the configured backend directories and every
    /// configured plugin path may be loaded and run. They must be trusted
    /// modules exporting the signatures in [`crate::abi`].
    pub unsafe fn from_config(config: DispatchConfig) -> Arc<Self> {
        let context = Self::empty(config.clone());
        for dir in &config.backend_dirs {
            // SAFETY: forwarded to the caller.
            let source = unsafe { DirectorySource::new(&dir.path, dir.kind) }
                .with_interfaces(dir.interfaces);
            context.add_source(dir.priority, source);
        }
        for (uid, path) in &config.plugins {
            // SAFETY: forwarded to the caller.
            context.register_plugin(*uid, unsafe { Location::library(path) });
        }
        tracing::info!(
            sources = context.catalog.read().source_count(),
            plugins = config.plugins.len(),
            "dispatch context created"
        );
        Arc::new(context)
    }

    fn empty(config: DispatchConfig) -> Self {
        Self {
            catalog: RwLock::new(ImplCatalog::new()),
            plugins: RwLock::new(HashMap::new()),
            priority: AtomicI32::new(config.priority.0),
            next_session: AtomicU64::new(1),
            config,
        }
    }

    /// Add a catalog source.
    pub fn add_source(&self, priority: i32, source: impl CatalogSource + 'static) {
        self.catalog.write().add_source(priority, source);
    }

    /// Add a single backend as its own catalog source.
    pub fn add_backend(&self, priority: i32, descriptor: ImplDescriptor) {
        let source = BuiltinSource::new(descriptor.name().to_string()).with(descriptor);
        self.add_source(priority, source);
    }

    /// Walk the catalog; see [`ImplCatalog::enumerate`].
    pub fn enumerate(&self, kind: Option<ImplKind>, interfaces: InterfaceFlags) -> Candidates {
        self.catalog.read().enumerate(kind, interfaces)
    }

    /// Set the priority hint applied to sessions initialized from now on.
    pub fn set_priority(&self, priority: Priority) {
        self.priority.store(priority.0, Ordering::Relaxed);
    }

    /// The current priority hint.
    pub fn priority(&self) -> Priority {
        Priority(self.priority.load(Ordering::Relaxed))
    }

    /// Make a legacy plugin module known under `uid`.
    pub fn register_plugin(&self, uid: PluginUid, location: Location) {
        tracing::debug!(%uid, location = ?location, "registered plugin");
        self.plugins.write().insert(uid, location);
    }

    /// Where the plugin `uid` lives, if known.
    pub fn plugin_location(&self, uid: PluginUid) -> Option<Location> {
        self.plugins.read().get(&uid).cloned()
    }

    /// Allocate a session id.
    pub(crate) fn next_session_id(&self) -> u64 {
        self.next_session.fetch_add(1, Ordering::Relaxed)
    }

    /// Settings this context was created with.
    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }
}

impl fmt::Debug for DispatchContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchContext")
            .field("catalog", &*self.catalog.read())
            .field("plugins", &self.plugins.read().len())
            .field("priority", &self.priority())
            .finish()
    }
}
