//! Plugin loading on a session.
//!
//! Backends that export the plugin family handle load/unload themselves.
//! For the rest the session keeps a [`PluginRegistry`] and registers the
//! instances it creates through the user register/unregister operations.

use super::{Session, lookup};
use crate::abi::{PluginHandle, PluginUid, UserLoadByPathFn, UserLoadFn, UserUnloadFn};
use crate::catalog::Location;
use crate::error::{Error, Result};
use crate::ops::{Operation, PluginOp};
use crate::plugin::{PLUGIN_API_VERSION, PluginHost, PluginRegistry};
use crate::status::Status;
use std::ffi::CString;
use std::path::Path;

impl Session {
    /// Forward a plugin-family operation, `None` if the backend lacks it.
    ///
    /// # Safety
    ///
    /// `F` must be the signature listed for `op` in [`crate::abi`].
    unsafe fn forward_plugin<F: Copy>(
        &self,
        op: PluginOp,
        call: impl FnOnce(F, crate::abi::NativeSession) -> Status,
    ) -> Result<Option<Status>> {
        let bound = self.ready()?;
        if !bound.backend.plugin.is_available(op) {
            return Ok(None);
        }
        // SAFETY: forwarded to the caller.
        let entry = unsafe { lookup::<_, F>(&bound.backend.plugin, op) }?;
        let _session = self.span.enter();
        let _call = self
            .context
            .config()
            .tracing
            .call_span(self.id, op.name())
            .entered();
        call(entry, bound.native).into_result().map(Some)
    }

    fn check_plugin_api(&self) -> Result<()> {
        if self.ready()?.backend.plugin.version() < PLUGIN_API_VERSION {
            return Err(Error::NotImplemented);
        }
        Ok(())
    }

    /// Load the video plugin `uid`.
    ///
    /// Forwarded to the backend when it manages plugins; otherwise the
    /// module registered with the context under `uid` is loaded.
    pub fn load_plugin(&mut self, uid: PluginUid, version: u32) -> Result<Status> {
        self.check_plugin_api()?;
        let forwarded = unsafe {
            self.forward_plugin(PluginOp::VideoUserLoad, |f: UserLoadFn, s| {
                f(s, &uid, version)
            })
        }?;
        if let Some(status) = forwarded {
            return Ok(status);
        }
        let location = self
            .context
            .plugin_location(uid)
            .ok_or(Error::PluginNotFound(uid))?;
        self.load_legacy(uid, version, &location)
    }

    /// Load the video plugin `uid` from the module at `path`.
    ///
    /// # Safety
    ///
    /// The module at `path` may be loaded and run. It must be a trusted
    /// plugin exporting the create/release entry points.
    pub unsafe fn load_plugin_from_path(
        &mut self,
        uid: PluginUid,
        version: u32,
        path: &Path,
    ) -> Result<Status> {
        self.check_plugin_api()?;
        let raw =
            CString::new(path.as_os_str().as_encoded_bytes()).map_err(|_| Error::InvalidParameter)?;
        let len = u32::try_from(raw.as_bytes().len()).map_err(|_| Error::InvalidParameter)?;
        let forwarded = unsafe {
            self.forward_plugin(PluginOp::VideoUserLoadByPath, |f: UserLoadByPathFn, s| {
                f(s, &uid, version, raw.as_ptr(), len)
            })
        }?;
        if let Some(status) = forwarded {
            return Ok(status);
        }
        // SAFETY: forwarded to the caller.
        let location = unsafe { Location::library(path) };
        self.load_legacy(uid, version, &location)
    }

    /// Unload the video plugin `uid`.
    pub fn unload_plugin(&mut self, uid: PluginUid) -> Result<Status> {
        self.ready()?;
        if self.plugins.as_ref().is_some_and(|r| r.contains(uid)) {
            return self.with_registry(|registry, host| registry.unload(uid, host));
        }
        let forwarded = unsafe {
            self.forward_plugin(PluginOp::VideoUserUnload, |f: UserUnloadFn, s| f(s, &uid))
        }?;
        forwarded.ok_or(Error::PluginNotFound(uid))
    }

    /// Load the audio plugin `uid`. Only backends that manage plugins
    /// support audio plugins.
    pub fn audio_load_plugin(&mut self, uid: PluginUid, version: u32) -> Result<Status> {
        let forwarded = unsafe {
            self.forward_plugin(PluginOp::AudioUserLoad, |f: UserLoadFn, s| {
                f(s, &uid, version)
            })
        }?;
        forwarded.ok_or(Error::NotImplemented)
    }

    /// Unload the audio plugin `uid`.
    pub fn audio_unload_plugin(&mut self, uid: PluginUid) -> Result<Status> {
        let forwarded = unsafe {
            self.forward_plugin(PluginOp::AudioUserUnload, |f: UserUnloadFn, s| f(s, &uid))
        }?;
        forwarded.ok_or(Error::NotImplemented)
    }

    /// Unload every legacy plugin, most recent first.
    pub(super) fn unload_all_plugins(&mut self) -> Result<Status> {
        if self.plugins.is_none() {
            return Ok(Status::NONE);
        }
        self.with_registry(|registry, host| registry.unload_all(host))
    }

    fn load_legacy(&mut self, uid: PluginUid, version: u32, location: &Location) -> Result<Status> {
        self.with_registry(|registry, host| registry.load(uid, version, location, host))
    }

    /// Run `f` with the registry taken out of the session, so the session
    /// itself can act as the host.
    fn with_registry(
        &mut self,
        f: impl FnOnce(&mut PluginRegistry, &mut dyn PluginHost) -> Result<Status>,
    ) -> Result<Status> {
        let mut registry = self.plugins.take().unwrap_or_default();
        let result = f(&mut registry, self);
        if !registry.is_empty() {
            self.plugins = Some(registry);
        }
        result
    }
}

impl PluginHost for Session {
    fn register(&mut self, plugin_type: u32, handle: PluginHandle) -> Result<Status> {
        self.user_register(plugin_type, handle)
    }

    fn unregister(&mut self, plugin_type: u32) -> Result<Status> {
        self.user_unregister(plugin_type)
    }
}
