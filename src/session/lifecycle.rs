//! Session lifecycle: init, clone, join, disjoin, close.

use super::{Bound, LoadedBackend, Session, SessionState, lookup};
use crate::abi::{
    Bitstream, CloneSessionFn, CloseFn, ImplKind, InitExFn, InitFn, InitParam, InterfaceFlags,
    JoinSessionFn, NativeSession, Priority, QueryImplFn, QueryVersionFn, SetPriorityFn,
    impl_code,
};
use crate::backend::{FunctionTable, LoadError};
use crate::catalog::ImplDescriptor;
use crate::context::DispatchContext;
use crate::error::{Error, Result};
use crate::observability::{
    InitTimer, SessionMetrics, record_candidate_rejected, trace_candidate_rejected,
    trace_teardown_error,
};
use crate::ops::{AudioOp, Operation, PluginOp, VideoOp};
use crate::status::Status;
use crate::version::ApiVersion;
use std::sync::Arc;
use std::sync::atomic::Ordering;

/// Operations a backend must export to be selected.
const REQUIRED: [VideoOp; 3] = [VideoOp::Close, VideoOp::QueryImpl, VideoOp::QueryVersion];

/// What a caller asks of the backend at init.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitParams {
    /// Requested kind; `None` accepts any.
    pub kind: Option<ImplKind>,
    /// Interfaces the backend must support; empty accepts any.
    pub interfaces: InterfaceFlags,
    /// Minimum API version.
    pub version: ApiVersion,
    /// Whether the caller provides worker threads.
    pub external_threads: bool,
    /// GPU copy mode passed through to the backend.
    pub gpu_copy: u16,
}

impl Default for InitParams {
    fn default() -> Self {
        Self {
            kind: None,
            interfaces: InterfaceFlags::empty(),
            version: ApiVersion::MIN,
            external_threads: false,
            gpu_copy: 0,
        }
    }
}

impl InitParams {
    /// Any backend providing at least `version`.
    pub fn new(version: ApiVersion) -> Self {
        Self {
            version,
            ..Self::default()
        }
    }

    /// Restrict to one kind.
    pub fn with_kind(mut self, kind: ImplKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Require interfaces.
    pub fn with_interfaces(mut self, interfaces: InterfaceFlags) -> Self {
        self.interfaces = interfaces;
        self
    }

    /// Declare caller-provided worker threads.
    pub fn with_external_threads(mut self, external: bool) -> Self {
        self.external_threads = external;
        self
    }

    /// Set the GPU copy mode.
    pub fn with_gpu_copy(mut self, mode: u16) -> Self {
        self.gpu_copy = mode;
        self
    }

    fn init_param(&self) -> InitParam {
        InitParam {
            implementation: impl_code(self.kind, self.interfaces),
            version: self.version,
            external_threads: u16::from(self.external_threads),
            gpu_copy: self.gpu_copy,
            reserved: [0; 4],
        }
    }
}

/// Why a candidate was passed over.
struct Rejection {
    reason: &'static str,
    error: Error,
}

impl Rejection {
    fn new(reason: &'static str, error: impl Into<Error>) -> Self {
        Self {
            reason,
            error: error.into(),
        }
    }
}

/// Create a native session through `InitEx`, or `Init` when absent.
fn create_native(
    video: &FunctionTable<VideoOp>,
    param: &InitParam,
) -> Result<(NativeSession, Status)> {
    let mut native = NativeSession::NULL;
    // SAFETY: slots are cast to the signatures listed for their operation;
    // both pointers outlive the call.
    let status = unsafe {
        if let Some(init_ex) = video.get::<InitExFn>(VideoOp::InitEx) {
            init_ex(param, &mut native)
        } else if let Some(init) = video.get::<InitFn>(VideoOp::Init) {
            let mut version = param.version;
            init(param.implementation, &mut version, &mut native)
        } else {
            return Err(Error::NotImplemented);
        }
    };
    let status = status.into_result()?;
    if native.is_null() {
        return Err(Error::InvalidHandle);
    }
    Ok((native, status))
}

/// Push the context's priority hint to a new native session.
fn apply_priority(video: &FunctionTable<VideoOp>, native: NativeSession, priority: Priority) {
    // SAFETY: cast to the listed signature; `native` is live.
    if let Some(set_priority) = unsafe { video.get::<SetPriorityFn>(VideoOp::SetPriority) } {
        let status = unsafe { set_priority(native, priority) };
        if status.is_error() {
            tracing::debug!(%status, priority = priority.0, "backend refused priority hint");
        }
    }
}

/// Try to bind one candidate.
fn bind(
    candidate: &ImplDescriptor,
    params: &InitParams,
    priority: Priority,
) -> std::result::Result<Bound, Rejection> {
    if let Some(version) = candidate.version() {
        if version < params.version {
            return Err(Rejection::new("version", Error::Unsupported));
        }
    }

    let module = candidate.load().map_err(|e| Rejection::new("load", e))?;
    let video = FunctionTable::<VideoOp>::build(&*module, params.version);
    for op in REQUIRED {
        if !video.is_available(op) {
            let missing = LoadError::MissingEntryPoint {
                module: candidate.name().to_string(),
                symbol: op.name(),
            };
            return Err(Rejection::new("entry_point", missing));
        }
    }

    let (native, load_status) =
        create_native(&video, &params.init_param()).map_err(|e| Rejection::new("init", e))?;

    // SAFETY: the required slots were checked above and are cast to their
    // listed signatures.
    let (close, query_version, query_impl) = unsafe {
        (
            video.get::<CloseFn>(VideoOp::Close),
            video.get::<QueryVersionFn>(VideoOp::QueryVersion),
            video.get::<QueryImplFn>(VideoOp::QueryImpl),
        )
    };
    let (Some(close), Some(query_version), Some(query_impl)) = (close, query_version, query_impl)
    else {
        return Err(Rejection::new("entry_point", Error::NotImplemented));
    };
    let reject = |reason: &'static str, error: Error| {
        // SAFETY: `native` was created above and is not used afterwards.
        let status = unsafe { close(native) };
        if status.is_error() {
            tracing::debug!(candidate = candidate.name(), %status, "closing rejected session failed");
        }
        Rejection::new(reason, error)
    };

    let mut actual = ApiVersion::default();
    // SAFETY: `native` is live and `actual` outlives the call.
    let status = unsafe { query_version(native, &mut actual) };
    if status.is_error() {
        return Err(reject("query", Error::from_status(status)));
    }
    if !actual.is_plausible() || actual < params.version {
        return Err(reject("version", Error::Unsupported));
    }

    let mut code = 0u32;
    // SAFETY: `native` is live and `code` outlives the call.
    let status = unsafe { query_impl(native, &mut code) };
    if status.is_error() {
        return Err(reject("query", Error::from_status(status)));
    }
    let Some(kind) = ImplKind::from_code(code) else {
        return Err(reject("kind", Error::Unsupported));
    };
    if params.kind.is_some_and(|requested| requested != kind) {
        return Err(reject("kind", Error::Unsupported));
    }
    let interfaces = InterfaceFlags::from_bits_truncate(code & !ImplKind::CODE_MASK);
    if !interfaces.is_empty() && !interfaces.satisfies(params.interfaces) {
        return Err(reject("interfaces", Error::Unsupported));
    }

    apply_priority(&video, native, priority);

    let backend = LoadedBackend {
        name: candidate.name().to_string(),
        plugin: FunctionTable::<PluginOp>::build(&*module, params.version),
        audio: FunctionTable::<AudioOp>::build(&*module, params.version),
        video,
        metrics: SessionMetrics::new(kind.as_str(), candidate.name()),
        _module: module,
    };
    Ok(Bound::new(
        Arc::new(backend),
        native,
        kind,
        interfaces,
        actual,
        load_status,
    ))
}

impl Session {
    /// Create a session and bind it in one step.
    ///
    /// No session is returned when no backend matches.
    pub fn open(context: &Arc<DispatchContext>, params: InitParams) -> Result<Self> {
        let mut session = Self::new(context);
        session.init(params)?;
        Ok(session)
    }

    /// Select and bind a backend.
    ///
    /// Candidates are tried in catalog order; the first one that loads,
    /// exports the required entry points, and reports a matching kind and
    /// at least the requested version wins. Returns the backend's init
    /// status, which may be a warning.
    pub fn init(&mut self, params: InitParams) -> Result<Status> {
        match self.state {
            SessionState::Uninitialized => {}
            SessionState::Closed => return Err(Error::InvalidHandle),
            SessionState::Loading | SessionState::Ready => return Err(Error::UndefinedBehavior),
        }
        let kind_label = params.kind.map_or("any", ImplKind::as_str);
        let spans = self.context.config().tracing.clone();
        let span = spans.init_span(self.id, kind_label, &params.version.to_string());
        let _guard = span.enter();
        let mut timer = InitTimer::start();

        self.required = params.version;
        self.set_state(SessionState::Loading);
        let priority = self.context.priority();

        for candidate in self.context.enumerate(params.kind, params.interfaces) {
            match bind(&candidate, &params, priority) {
                Ok(bound) => {
                    timer.succeeded();
                    let status = bound.load_status;
                    tracing::info!(
                        session = self.id,
                        backend = candidate.name(),
                        kind = %bound.kind,
                        version = %bound.version,
                        elapsed_us = timer.elapsed().as_micros() as u64,
                        "session bound"
                    );
                    self.span = spans.session_span(self.id, candidate.name());
                    self.bound = Some(bound);
                    self.set_state(SessionState::Ready);
                    return Ok(status);
                }
                Err(rejection) => {
                    record_candidate_rejected(rejection.reason);
                    trace_candidate_rejected(candidate.name(), rejection.reason, &rejection.error);
                }
            }
        }

        self.set_state(SessionState::Uninitialized);
        tracing::debug!(session = self.id, kind = kind_label, version = %params.version, "no implementation matched");
        Err(Error::NoMatchingImplementation {
            kind: params.kind,
            version: params.version,
        })
    }

    /// Create an independent session on the same backend.
    ///
    /// Uses the backend's `CloneSession`, or its init entry at the actual
    /// version when that is absent. The clone shares the loaded module.
    pub fn clone_session(&self) -> Result<Session> {
        let bound = self.ready()?;
        let backend = &bound.backend;
        // SAFETY: cast to the listed signature.
        let (native, status) = match unsafe { backend.video.get::<CloneSessionFn>(VideoOp::CloneSession) } {
            Some(clone) => {
                let mut native = NativeSession::NULL;
                // SAFETY: the parent session is live; `native` outlives the call.
                let status = unsafe { clone(bound.native, &mut native) }.into_result()?;
                if native.is_null() {
                    return Err(Error::InvalidHandle);
                }
                (native, status)
            }
            None => {
                let param = InitParam {
                    implementation: impl_code(Some(bound.kind), bound.interfaces),
                    version: bound.version,
                    ..InitParam::default()
                };
                let created = create_native(&backend.video, &param)?;
                apply_priority(&backend.video, created.0, self.context.priority());
                created
            }
        };

        let id = self.context.next_session_id();
        tracing::info!(session = id, parent = self.id, backend = %backend.name, "session cloned");
        Ok(Session {
            id,
            context: Arc::clone(&self.context),
            state: SessionState::Ready,
            required: self.required,
            bound: Some(Bound::new(
                Arc::clone(backend),
                native,
                bound.kind,
                bound.interfaces,
                bound.version,
                status,
            )),
            plugins: None,
            span: self.context.config().tracing.session_span(id, &backend.name),
        })
    }

    /// Join `child` to this session so they share scheduling.
    ///
    /// Both sessions must be bound to the same backend and `child` must not
    /// be joined already or have children of its own.
    pub fn join(&mut self, child: &mut Session) -> Result<Status> {
        let parent = self.ready()?;
        let joined = child.ready()?;
        if !Arc::ptr_eq(&parent.backend, &joined.backend)
            && !parent.backend.same_code(&joined.backend)
        {
            return Err(Error::Unsupported);
        }
        if joined.parent.is_some() || joined.joined_children() > 0 {
            return Err(Error::UndefinedBehavior);
        }
        // SAFETY: cast to the listed signature.
        let join: JoinSessionFn = unsafe { lookup(&parent.backend.video, VideoOp::JoinSession) }?;
        // SAFETY: both native sessions are live.
        let status = unsafe { join(parent.native, joined.native) }.into_result()?;

        parent.children.fetch_add(1, Ordering::AcqRel);
        let link = Arc::clone(&parent.children);
        let (parent_id, child_id) = (self.id, child.id);
        child.ready_mut()?.parent = Some(link);
        tracing::debug!(parent = parent_id, child = child_id, "sessions joined");
        Ok(status)
    }

    /// Detach this session from its parent. A no-op when not joined.
    pub fn disjoin(&mut self) -> Result<Status> {
        let bound = self.ready()?;
        let Some(parent) = bound.parent.clone() else {
            return Ok(Status::NONE);
        };
        // SAFETY: cast to the listed signature.
        let disjoin: CloseFn = unsafe { lookup(&bound.backend.video, VideoOp::DisjoinSession) }?;
        // SAFETY: the native session is live.
        let status = unsafe { disjoin(bound.native) }.into_result()?;
        parent.fetch_sub(1, Ordering::AcqRel);
        self.ready_mut()?.parent = None;
        tracing::debug!(session = self.id, "session disjoined");
        Ok(status)
    }

    /// Close the session and release its backend.
    ///
    /// Drains and closes open components, unloads plugins, then closes the
    /// native session. The session ends `Closed` even when a step fails;
    /// the first failure is returned. Refused while other sessions are
    /// joined to this one.
    pub fn close(&mut self) -> Result<Status> {
        match self.state {
            SessionState::Closed => return Err(Error::AlreadyClosed),
            SessionState::Uninitialized | SessionState::Loading => {
                self.set_state(SessionState::Closed);
                return Ok(Status::NONE);
            }
            SessionState::Ready => {}
        }
        let children = self.joined_children();
        if children > 0 {
            return Err(Error::JoinedChildren(children));
        }

        let span = self.span.clone();
        let _guard = span.enter();
        let id = self.id;
        let mut first_error: Option<Error> = None;
        let mut note = |step: &str, result: Result<()>| {
            if let Err(e) = result {
                trace_teardown_error(id, step, &e);
                first_error.get_or_insert(e);
            }
        };

        if self.is_joined() {
            note("disjoin", self.disjoin().map(drop));
            if let Some(parent) = self.bound.as_mut().and_then(|b| b.parent.take()) {
                parent.fetch_sub(1, Ordering::AcqRel);
            }
        }

        let components = self.bound.as_ref().map(|b| b.components).unwrap_or_default();
        if components.encode {
            note("drain", self.drain_for_close().map(drop));
            note("encode_close", self.encode_close().map(drop));
        }
        if components.decode {
            note("decode_close", self.decode_close().map(drop));
        }
        if components.vpp {
            note("vpp_close", self.vpp_close().map(drop));
        }
        if components.audio_encode {
            note("audio_encode_close", self.audio_encode_close().map(drop));
        }
        if components.audio_decode {
            note("audio_decode_close", self.audio_decode_close().map(drop));
        }
        note("plugins", self.unload_all_plugins().map(drop));

        if let Some(bound) = self.bound.take() {
            // SAFETY: Close is a required slot, cast to its listed signature.
            let result = unsafe { lookup::<_, CloseFn>(&bound.backend.video, VideoOp::Close) }
                .and_then(|close| unsafe { close(bound.native) }.into_result());
            note("close", result.map(drop));
            bound.backend.metrics.record_closed();
        }
        self.set_state(SessionState::Closed);
        tracing::info!(session = id, "session closed");

        match first_error {
            Some(e) => Err(e),
            None => Ok(Status::NONE),
        }
    }

    /// Flush every frame the encoder still buffers, handing each packet to
    /// `on_packet`. Returns the number of packets.
    ///
    /// The scratch bitstream starts at the configured drain buffer size and
    /// doubles on `NotEnoughBuffer` up to the configured limit.
    pub fn drain_encoder(&mut self, mut on_packet: impl FnMut(&[u8])) -> Result<usize> {
        let config = self.context.config();
        let mut scratch = vec![0u8; config.drain_buffer_size.max(1)];
        let limit = config.max_drain_buffer_size;
        self.drain_with(&mut scratch, limit, &mut on_packet)
    }

    fn drain_for_close(&mut self) -> Result<usize> {
        let packets = self.drain_encoder(|_| {})?;
        if packets > 0 {
            tracing::debug!(session = self.id, packets, "discarded encoder output at close");
        }
        Ok(packets)
    }

    fn drain_with(
        &mut self,
        scratch: &mut Vec<u8>,
        limit: usize,
        on_packet: &mut dyn FnMut(&[u8]),
    ) -> Result<usize> {
        let mut packets = 0;
        loop {
            let outcome = {
                let mut bs = Bitstream::from_slice(scratch.as_mut_slice());
                match self.encode_frame_async(None, None, &mut bs) {
                    Ok((_, sync)) => {
                        if let Some(sync) = sync {
                            self.sync_operation(sync, super::dispatch::WAIT_INFINITE)?;
                        }
                        on_packet(bs.filled());
                        Ok(())
                    }
                    Err(e) => Err(e),
                }
            };
            match outcome {
                Ok(()) => packets += 1,
                Err(Error::MoreData) => return Ok(packets),
                Err(Error::NotEnoughBuffer) => {
                    let grown = scratch.len().saturating_mul(2);
                    if grown > limit {
                        return Err(Error::NotEnoughBuffer);
                    }
                    tracing::debug!(session = self.id, size = grown, "growing drain buffer");
                    scratch.resize(grown, 0);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Set the priority hint for sessions initialized from now on.
    ///
    /// The hint is shared by every session of the context and does not
    /// affect sessions that are already bound.
    pub fn set_priority(&self, priority: Priority) -> Result<()> {
        if self.state == SessionState::Closed {
            return Err(Error::InvalidHandle);
        }
        if !(Priority::LOW.0..=Priority::HIGH.0).contains(&priority.0) {
            return Err(Error::InvalidParameter);
        }
        self.context.set_priority(priority);
        Ok(())
    }

    /// The current priority hint.
    pub fn get_priority(&self) -> Result<Priority> {
        if self.state == SessionState::Closed {
            return Err(Error::InvalidHandle);
        }
        Ok(self.context.priority())
    }
}
