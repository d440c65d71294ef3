//! Legacy plugin loading.
//!
//! Older backends do not manage plugins themselves. For those, the
//! dispatcher loads the plugin module, instantiates the plugin through its
//! exported create entry point and registers the instance with the session.
//!
//! # Plugin Structure
//!
//! A plugin module exports two symbols:
//!
//! ```c
//! mxStatus mx_plugin_create(const mxPluginUID* uid, mxU32 version,
//!                           mxPluginHandle* out_handle, mxU32* out_type);
//! mxStatus mx_plugin_release(mxPluginHandle handle);
//! ```
//!
//! Backends that export the plugin family (`VideoUserLoad` and friends) get
//! the request forwarded instead and this registry is not used.

mod registry;

pub use registry::{PluginHost, PluginRegistry};

use crate::version::ApiVersion;

/// First API version with plugin loading.
pub const PLUGIN_API_VERSION: ApiVersion = ApiVersion::new(1, 8);
