//! A legacy plugin module for the pseudo backend.

use crate::abi::{PluginHandle, PluginUid};
use crate::backend::StaticModule;
use crate::ops::{Operation, PluginEntryOp};
use crate::status::Status;
use parking_lot::Mutex;
use std::ffi::c_void;

/// Uids of every plugin instance currently alive, one entry per instance.
static LIVE: Mutex<Vec<PluginUid>> = parking_lot::const_mutex(Vec::new());

struct PseudoPlugin {
    uid: PluginUid,
}

unsafe extern "C" fn create(
    uid: *const PluginUid,
    _version: u32,
    out: *mut PluginHandle,
    plugin_type: *mut u32,
) -> Status {
    // SAFETY: uid is null or points at a plugin identifier.
    let Some(uid) = (unsafe { uid.as_ref() }).copied() else {
        return Status::ERR_NULL_PTR;
    };
    if out.is_null() || plugin_type.is_null() {
        return Status::ERR_NULL_PTR;
    }
    LIVE.lock().push(uid);
    let plugin = Box::into_raw(Box::new(PseudoPlugin { uid }));
    // SAFETY: both out pointers were checked non-null.
    unsafe {
        out.write(PluginHandle(plugin.cast()));
        // The first uid byte selects the plugin type so tests can load
        // several plugins into one session.
        plugin_type.write(uid.0[0] as u32);
    }
    Status::NONE
}

unsafe extern "C" fn release(handle: PluginHandle) -> Status {
    if handle.0.is_null() {
        return Status::ERR_INVALID_HANDLE;
    }
    // SAFETY: handles come from `create`.
    let plugin = unsafe { Box::from_raw(handle.0.cast::<PseudoPlugin>()) };
    let mut live = LIVE.lock();
    if let Some(pos) = live.iter().position(|uid| *uid == plugin.uid) {
        live.swap_remove(pos);
    }
    Status::NONE
}

/// A plugin module exporting the legacy create/release pair.
pub fn plugin_module(name: impl Into<String>) -> StaticModule {
    StaticModule::new(name)
        .export(PluginEntryOp::Create.symbol(), create as *const c_void)
        .export(PluginEntryOp::Release.symbol(), release as *const c_void)
}

/// Number of live plugin instances created for `uid`.
pub fn live_instances(uid: PluginUid) -> usize {
    LIVE.lock().iter().filter(|live| **live == uid).count()
}
