//! Sessions: the stable handle callers hold.
//!
//! A [`Session`] starts `Uninitialized`, becomes `Ready` once
//! [`Session::init`] has bound it to a backend, and ends `Closed`. Every
//! boundary method checks the state, validates payload pointers, looks the
//! operation up in the bound backend's function table and forwards the
//! call. Operations the backend does not export fail with
//! [`Error::NotImplemented`] instead of crashing.
//!
//! ```rust,ignore
//! use mxdispatch::prelude::*;
//!
//! let context = DispatchContext::with_pseudo_backend();
//! let mut session = Session::open(&context, InitParams::new(ApiVersion::new(2, 0)))?;
//! println!("bound to {} ({})", session.backend_name().unwrap(), session.kind().unwrap());
//! session.close()?;
//! ```

mod audio;
mod dispatch;
mod lifecycle;
mod plugins;

pub use dispatch::WAIT_INFINITE;
pub use lifecycle::InitParams;

use crate::abi::{ImplKind, InterfaceFlags, NativeSession, RawEntry};
use crate::backend::{FunctionTable, SymbolSource};
use crate::context::DispatchContext;
use crate::error::{Error, Result};
use crate::observability::{SessionMetrics, record_unavailable_call};
use crate::ops::{AudioOp, Operation, PluginOp, VideoOp};
use crate::plugin::PluginRegistry;
use crate::status::Status;
use crate::version::ApiVersion;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::Span;

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Created, not bound to a backend.
    Uninitialized,
    /// Backend selection in progress.
    Loading,
    /// Bound to a backend.
    Ready,
    /// Closed; every call fails with [`Error::InvalidHandle`].
    Closed,
}

impl SessionState {
    /// State name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "Uninitialized",
            Self::Loading => "Loading",
            Self::Ready => "Ready",
            Self::Closed => "Closed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A backend module with its function tables.
///
/// Shared by a session and its clones; the module is unloaded when the last
/// one closes.
pub(crate) struct LoadedBackend {
    name: String,
    video: FunctionTable<VideoOp>,
    plugin: FunctionTable<PluginOp>,
    audio: FunctionTable<AudioOp>,
    metrics: SessionMetrics,
    // Dropped last: the tables point into the module.
    _module: Arc<dyn SymbolSource>,
}

impl LoadedBackend {
    /// Entry that creates native sessions; identifies the backend code.
    fn init_entry(&self) -> Option<RawEntry> {
        self.video
            .entry(VideoOp::InitEx)
            .or_else(|| self.video.entry(VideoOp::Init))
    }

    /// Whether `other` runs the same backend code.
    fn same_code(&self, other: &LoadedBackend) -> bool {
        match (self.init_entry(), other.init_entry()) {
            (Some(a), Some(b)) => a.as_ptr() == b.as_ptr(),
            _ => false,
        }
    }
}

/// Components opened on a native session; closed at teardown.
#[derive(Debug, Clone, Copy, Default)]
struct Components {
    encode: bool,
    decode: bool,
    vpp: bool,
    audio_encode: bool,
    audio_decode: bool,
}

/// The part of a session that exists while it is `Ready`.
struct Bound {
    backend: Arc<LoadedBackend>,
    native: NativeSession,
    kind: ImplKind,
    interfaces: InterfaceFlags,
    version: ApiVersion,
    load_status: Status,
    children: Arc<AtomicUsize>,
    parent: Option<Arc<AtomicUsize>>,
    components: Components,
}

impl Bound {
    fn new(
        backend: Arc<LoadedBackend>,
        native: NativeSession,
        kind: ImplKind,
        interfaces: InterfaceFlags,
        version: ApiVersion,
        load_status: Status,
    ) -> Self {
        backend.metrics.record_opened();
        Self {
            backend,
            native,
            kind,
            interfaces,
            version,
            load_status,
            children: Arc::new(AtomicUsize::new(0)),
            parent: None,
            components: Components::default(),
        }
    }

    fn joined_children(&self) -> usize {
        self.children.load(Ordering::Acquire)
    }
}

/// Look up `op`, counting calls to absent operations.
///
/// # Safety
///
/// `F` must be the signature listed for `op` in [`crate::abi`].
unsafe fn lookup<O: Operation, F: Copy>(table: &FunctionTable<O>, op: O) -> Result<F> {
    // SAFETY: forwarded to the caller.
    match unsafe { table.get::<F>(op) } {
        Some(entry) => Ok(entry),
        None => {
            record_unavailable_call(O::FAMILY.as_str(), op.name());
            tracing::trace!(family = %O::FAMILY, op = op.name(), "operation not available");
            Err(Error::NotImplemented)
        }
    }
}

/// A dispatcher session.
///
/// `Send` but not `Sync`: a session may move between threads but must not
/// be used from two threads at once. Dropping a `Ready` session closes it.
pub struct Session {
    id: u64,
    context: Arc<DispatchContext>,
    state: SessionState,
    required: ApiVersion,
    bound: Option<Bound>,
    plugins: Option<PluginRegistry>,
    span: Span,
}

// SAFETY: native session handles are not tied to the creating thread; the
// raw pointers inside `Bound` keep `Session` from being `Sync`.
unsafe impl Send for Session {}

impl Session {
    /// A fresh, unbound session.
    pub fn new(context: &Arc<DispatchContext>) -> Self {
        Self {
            id: context.next_session_id(),
            context: Arc::clone(context),
            state: SessionState::Uninitialized,
            required: ApiVersion::MIN,
            bound: None,
            plugins: None,
            span: Span::none(),
        }
    }

    /// Session id, unique within its context.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Context the session belongs to.
    pub fn context(&self) -> &Arc<DispatchContext> {
        &self.context
    }

    /// API version requested at init.
    pub fn required_version(&self) -> ApiVersion {
        self.required
    }

    /// Kind of the bound backend.
    pub fn kind(&self) -> Option<ImplKind> {
        self.bound.as_ref().map(|b| b.kind)
    }

    /// Interfaces the bound backend reported.
    pub fn interfaces(&self) -> Option<InterfaceFlags> {
        self.bound.as_ref().map(|b| b.interfaces)
    }

    /// API version the bound backend reported.
    pub fn actual_version(&self) -> Option<ApiVersion> {
        self.bound.as_ref().map(|b| b.version)
    }

    /// Status the backend's init returned, warnings included.
    pub fn load_status(&self) -> Option<Status> {
        self.bound.as_ref().map(|b| b.load_status)
    }

    /// Name of the bound backend.
    pub fn backend_name(&self) -> Option<&str> {
        self.bound.as_ref().map(|b| b.backend.name.as_str())
    }

    /// Whether the session is joined to a parent.
    pub fn is_joined(&self) -> bool {
        self.bound.as_ref().is_some_and(|b| b.parent.is_some())
    }

    /// Number of sessions joined to this one.
    pub fn joined_children(&self) -> usize {
        self.bound.as_ref().map_or(0, Bound::joined_children)
    }

    /// Number of plugins loaded through the legacy path.
    pub fn loaded_plugins(&self) -> usize {
        self.plugins.as_ref().map_or(0, PluginRegistry::len)
    }

    /// Whether the bound backend provides `op`.
    pub fn is_available(&self, op: VideoOp) -> bool {
        self.bound
            .as_ref()
            .is_some_and(|b| b.backend.video.is_available(op))
    }

    /// Whether the bound backend provides the plugin-family `op`.
    pub fn is_plugin_op_available(&self, op: PluginOp) -> bool {
        self.bound
            .as_ref()
            .is_some_and(|b| b.backend.plugin.is_available(op))
    }

    /// Whether the bound backend provides the audio `op`.
    pub fn is_audio_available(&self, op: AudioOp) -> bool {
        self.bound
            .as_ref()
            .is_some_and(|b| b.backend.audio.is_available(op))
    }

    /// The bound part, after the state check every call starts with.
    fn ready(&self) -> Result<&Bound> {
        match (self.state, &self.bound) {
            (SessionState::Ready, Some(bound)) => Ok(bound),
            (SessionState::Closed, _) => Err(Error::InvalidHandle),
            _ => Err(Error::NotInitialized),
        }
    }

    fn ready_mut(&mut self) -> Result<&mut Bound> {
        match (self.state, &mut self.bound) {
            (SessionState::Ready, Some(bound)) => Ok(bound),
            (SessionState::Closed, _) => Err(Error::InvalidHandle),
            _ => Err(Error::NotInitialized),
        }
    }

    fn set_state(&mut self, state: SessionState) {
        crate::observability::trace_state_change(self.id, self.state.as_str(), state.as_str());
        self.state = state;
    }

    /// Forward a video operation to the bound backend.
    ///
    /// # Safety
    ///
    /// `F` must be the signature listed for `op` in [`crate::abi`], and
    /// `call` must pass pointers valid for the duration of the call.
    unsafe fn forward<F: Copy>(
        &self,
        op: VideoOp,
        call: impl FnOnce(F, NativeSession) -> Status,
    ) -> Result<Status> {
        let bound = self.ready()?;
        // SAFETY: forwarded to the caller.
        let entry = unsafe { lookup::<_, F>(&bound.backend.video, op) }?;
        let _session = self.span.enter();
        let _call = self
            .context
            .config()
            .tracing
            .call_span(self.id, op.name())
            .entered();
        call(entry, bound.native).into_result()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("backend", &self.backend_name())
            .field("kind", &self.kind())
            .field("version", &self.actual_version())
            .finish()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.state != SessionState::Ready {
            return;
        }
        match self.close() {
            Ok(_) => {}
            Err(Error::JoinedChildren(n)) => {
                // Children still run on the native session. It is never
                // closed, and the backend module stays loaded for the rest
                // of the process.
                tracing::warn!(
                    session = self.id,
                    children = n,
                    "dropped a session with joined children, leaking its native session"
                );
                if let Some(bound) = self.bound.take() {
                    bound.backend.metrics.record_closed();
                    std::mem::forget(bound);
                }
                self.set_state(SessionState::Closed);
            }
            Err(e) => {
                tracing::warn!(session = self.id, error = %e, "error closing dropped session");
            }
        }
    }
}
