//! Per-session registry of legacy plugins.

use crate::abi::{PluginCreateFn, PluginHandle, PluginReleaseFn, PluginUid};
use crate::backend::{FunctionTable, LoadError, SymbolSource};
use crate::catalog::Location;
use crate::error::{Error, Result};
use crate::ops::{Operation, PluginEntryOp};
use crate::status::Status;
use crate::version::ApiVersion;
use std::fmt;
use std::sync::Arc;

/// Receives plugin instances created by the registry.
///
/// A session implements this by forwarding to its backend's user
/// register/unregister operations.
pub trait PluginHost {
    /// Attach `handle` as the plugin of type `plugin_type`.
    fn register(&mut self, plugin_type: u32, handle: PluginHandle) -> Result<Status>;

    /// Detach the plugin of type `plugin_type`.
    fn unregister(&mut self, plugin_type: u32) -> Result<Status>;
}

/// One plugin instance owned by the registry.
struct LoadedPlugin {
    uid: PluginUid,
    version: u32,
    plugin_type: u32,
    handle: PluginHandle,
    table: FunctionTable<PluginEntryOp>,
    // Dropped after the table.
    _module: Arc<dyn SymbolSource>,
}

impl LoadedPlugin {
    fn release(&self) -> Result<Status> {
        // SAFETY: Release was checked present at load, cast to its listed
        // signature.
        let release: PluginReleaseFn =
            unsafe { self.table.get(PluginEntryOp::Release) }.ok_or(Error::NotImplemented)?;
        // SAFETY: the handle came from this module's Create and is released
        // exactly once.
        unsafe { release(self.handle) }.into_result()
    }
}

/// Legacy plugins loaded into one session, in load order.
///
/// Plugins are unloaded in reverse load order.
#[derive(Default)]
pub struct PluginRegistry {
    entries: Vec<LoadedPlugin>,
}

impl PluginRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the plugin `uid` from `location` and register it with `host`.
    ///
    /// Fails with [`Error::UndefinedBehavior`] if `uid` is already loaded.
    /// If the host refuses the instance it is released again.
    pub fn load(
        &mut self,
        uid: PluginUid,
        version: u32,
        location: &Location,
        host: &mut dyn PluginHost,
    ) -> Result<Status> {
        if self.contains(uid) {
            return Err(Error::UndefinedBehavior);
        }
        let module = location.load()?;
        let table = FunctionTable::<PluginEntryOp>::build(&*module, ApiVersion::CURRENT);
        for op in [PluginEntryOp::Create, PluginEntryOp::Release] {
            if !table.is_available(op) {
                return Err(LoadError::MissingEntryPoint {
                    module: module.name().to_string(),
                    symbol: op.name(),
                }
                .into());
            }
        }

        // SAFETY: checked present above, cast to its listed signature.
        let create: PluginCreateFn =
            unsafe { table.get(PluginEntryOp::Create) }.ok_or(Error::NotImplemented)?;
        let mut handle = PluginHandle::NULL;
        let mut plugin_type = 0u32;
        // SAFETY: every pointer refers to a live local.
        unsafe { create(&uid, version, &mut handle, &mut plugin_type) }.into_result()?;
        if handle.is_null() {
            return Err(Error::InvalidHandle);
        }

        let plugin = LoadedPlugin {
            uid,
            version,
            plugin_type,
            handle,
            table,
            _module: module,
        };
        let status = match host.register(plugin_type, handle) {
            Ok(status) => status,
            Err(e) => {
                if let Err(release) = plugin.release() {
                    tracing::debug!(%uid, error = %release, "release after failed register");
                }
                return Err(e);
            }
        };
        tracing::debug!(%uid, version, plugin_type, "plugin loaded");
        self.entries.push(plugin);
        Ok(status)
    }

    /// Unregister and release the plugin `uid`.
    ///
    /// The plugin is forgotten even when a step fails; the first failure is
    /// returned.
    pub fn unload(&mut self, uid: PluginUid, host: &mut dyn PluginHost) -> Result<Status> {
        let pos = self
            .entries
            .iter()
            .position(|p| p.uid == uid)
            .ok_or(Error::PluginNotFound(uid))?;
        let plugin = self.entries.remove(pos);
        Self::teardown(plugin, host)
    }

    /// Unload every plugin, most recently loaded first.
    pub fn unload_all(&mut self, host: &mut dyn PluginHost) -> Result<Status> {
        let mut first_error = None;
        while let Some(plugin) = self.entries.pop() {
            if let Err(e) = Self::teardown(plugin, host) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(Status::NONE), Err)
    }

    fn teardown(plugin: LoadedPlugin, host: &mut dyn PluginHost) -> Result<Status> {
        let unregistered = host.unregister(plugin.plugin_type);
        let released = plugin.release();
        tracing::debug!(uid = %plugin.uid, "plugin unloaded");
        unregistered.and(released)
    }

    /// Whether `uid` is loaded.
    pub fn contains(&self, uid: PluginUid) -> bool {
        self.entries.iter().any(|p| p.uid == uid)
    }

    /// Version `uid` was loaded with.
    pub fn version_of(&self, uid: PluginUid) -> Option<u32> {
        self.entries.iter().find(|p| p.uid == uid).map(|p| p.version)
    }

    /// Number of loaded plugins.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no plugin is loaded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Loaded plugin ids, in load order.
    pub fn uids(&self) -> impl Iterator<Item = PluginUid> + '_ {
        self.entries.iter().map(|p| p.uid)
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.uids()).finish()
    }
}
