//! # mxdispatch
//!
//! Runtime dispatcher for a versioned media-processing API.
//!
//! Applications program against one stable surface: a [`Session`] with
//! encode, decode, video processing and audio operations. At init the
//! dispatcher walks a catalog of backend implementations (hardware,
//! software, pseudo), loads each candidate, checks it against the
//! requested kind, interfaces and API version, and binds the session to
//! the first one that passes. Every later call is forwarded through the
//! bound backend's function table.
//!
//! ## Features
//!
//! - **Version gating**: operations newer than the requested API version are
//!   never resolved and fail with `NotImplemented`
//! - **Stable identifiers**: operation positions and native symbols never move
//! - **Session lifecycle**: init, clone, join/disjoin, priority, ordered close
//! - **Legacy plugins**: loaded and registered by the dispatcher for
//!   backends that cannot do it themselves
//! - **Pseudo backend**: a complete in-process backend for testing
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use mxdispatch::prelude::*;
//!
//! let context = DispatchContext::with_pseudo_backend();
//! let mut session = Session::open(&context, InitParams::new(ApiVersion::new(2, 0)))?;
//!
//! let mut par = VideoParam::default();
//! session.encode_query(None, &mut par)?;
//! session.encode_init(&par)?;
//! // ... submit frames ...
//! session.close()?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod abi;
pub mod backend;
pub mod catalog;
pub mod config;
pub mod context;
pub mod error;
pub mod observability;
pub mod ops;
pub mod plugin;
pub mod session;
pub mod status;
pub mod version;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::abi::{
        AudioFrame, AudioParam, Bitstream, FrameInfo, FrameSurface, ImplKind, InterfaceFlags,
        PluginUid, Priority, SyncPoint, VideoParam,
    };
    pub use crate::catalog::{ImplDescriptor, Location};
    pub use crate::config::DispatchConfig;
    pub use crate::context::DispatchContext;
    pub use crate::error::{Error, Result};
    pub use crate::ops::{AudioOp, Operation, PluginOp, VideoOp};
    pub use crate::session::{InitParams, Session, SessionState, WAIT_INFINITE};
    pub use crate::status::Status;
    pub use crate::version::ApiVersion;
}

pub use error::{Error, Result};
