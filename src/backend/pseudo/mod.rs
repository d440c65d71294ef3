//! Built-in pseudo backend.
//!
//! A complete in-process backend working on system memory. It validates
//! parameters the way the software encoder does, buffers frames like a real
//! encoder with B-frames, and emits self-describing packets instead of
//! compressed video. It serves as the `Pseudo` (or stand-in `Software`)
//! candidate and as the reference for the backend contract:
//!
//! - `Query` is pure and idempotent and fills every unset field,
//! - `Init` runs the same validation, so query-then-init always succeeds,
//! - the encoder must be drained before it can be closed.
//!
//! The reported kind and API version are chosen with const generics:
//!
//! ```rust,ignore
//! use mxdispatch::abi::ImplKind;
//! use mxdispatch::backend::pseudo;
//!
//! let sw_2_1 = pseudo::module::<{ ImplKind::Software.code() }, 2, 1>("sw-2.1");
//! ```

mod decode;
mod encode;
mod plugin;
mod vpp;

pub use encode::{PACKET_HEADER_LEN, PACKET_MAGIC};
pub use plugin::{live_instances, plugin_module};

use super::StaticModule;
use crate::abi::{
    FrameAllocator, Handle, HandleType, ImplKind, InitParam, InterfaceFlags, NativeSession,
    Platform, PluginHandle, Priority, SyncPoint,
};
use crate::ops::{Operation, VideoOp};
use crate::status::Status;
use crate::version::ApiVersion;
use std::collections::VecDeque;
use std::ffi::c_void;
use std::ptr;

/// Interfaces the pseudo backend can serve.
pub const INTERFACES: InterfaceFlags = InterfaceFlags::SYSTEM_MEMORY;

/// State behind one native pseudo session.
struct PseudoSession {
    kind: ImplKind,
    version: ApiVersion,
    priority: Priority,
    parent: Option<*mut PseudoSession>,
    children: u32,
    encoder: Option<encode::Encoder>,
    decoder: Option<decode::Decoder>,
    vpp: Option<vpp::Vpp>,
    pending_tasks: VecDeque<usize>,
    next_task: usize,
    user_plugins: Vec<(u32, PluginHandle)>,
}

impl PseudoSession {
    fn new(kind: ImplKind, version: ApiVersion) -> Self {
        Self {
            kind,
            version,
            priority: Priority::NORMAL,
            parent: None,
            children: 0,
            encoder: None,
            decoder: None,
            vpp: None,
            pending_tasks: VecDeque::new(),
            next_task: 1,
            user_plugins: Vec::new(),
        }
    }

    fn into_native(self) -> NativeSession {
        NativeSession(Box::into_raw(Box::new(self)).cast())
    }

    /// Schedule a task and hand out its completion token.
    ///
    /// At most `async_depth` tasks stay in flight; submitting past that
    /// completes the oldest one, so callers that never sync hold a bounded
    /// set.
    fn submit_task(&mut self, async_depth: u16) -> SyncPoint {
        let depth = usize::from(async_depth.max(1));
        while self.pending_tasks.len() >= depth {
            self.pending_tasks.pop_front();
        }
        let id = self.next_task;
        self.next_task += 1;
        self.pending_tasks.push_back(id);
        SyncPoint(ptr::without_provenance_mut(id))
    }

    fn complete_task(&mut self, id: usize) -> bool {
        match self.pending_tasks.iter().position(|&pending| pending == id) {
            Some(at) => {
                self.pending_tasks.remove(at);
                true
            }
            None => false,
        }
    }
}

/// Borrow the session behind a native handle.
///
/// # Safety
///
/// `session` must be null or a live handle created by this backend.
unsafe fn session_mut<'a>(session: NativeSession) -> Option<&'a mut PseudoSession> {
    // SAFETY: non-null handles come from `PseudoSession::into_native`.
    unsafe { session.0.cast::<PseudoSession>().as_mut() }
}

/// Run `f` on the session, mapping a null handle to `ERR_INVALID_HANDLE`.
///
/// # Safety
///
/// Same as [`session_mut`].
unsafe fn with_session(
    session: NativeSession,
    f: impl FnOnce(&mut PseudoSession) -> Status,
) -> Status {
    // SAFETY: forwarded to the caller.
    match unsafe { session_mut(session) } {
        Some(s) => f(s),
        None => Status::ERR_INVALID_HANDLE,
    }
}

/// Write `value` through `out`, rejecting null.
///
/// # Safety
///
/// `out` must be null or valid for writes.
unsafe fn write_out<T>(out: *mut T, value: T) -> Status {
    if out.is_null() {
        return Status::ERR_NULL_PTR;
    }
    // SAFETY: non-null and valid per the caller.
    unsafe { out.write(value) };
    Status::NONE
}

fn accepts(kind: ImplKind, version: ApiVersion, code: u32, requested: ApiVersion) -> Status {
    if let Some(asked) = ImplKind::from_code(code) {
        if asked != kind {
            return Status::ERR_UNSUPPORTED;
        }
    }
    let interfaces = InterfaceFlags::from_bits_truncate(code & !ImplKind::CODE_MASK);
    if !INTERFACES.satisfies(interfaces) {
        return Status::ERR_UNSUPPORTED;
    }
    if requested > version {
        return Status::ERR_UNSUPPORTED;
    }
    Status::NONE
}

unsafe extern "C" fn init<const KIND: u32, const MAJOR: u16, const MINOR: u16>(
    code: u32,
    version: *mut ApiVersion,
    out: *mut NativeSession,
) -> Status {
    let Some(kind) = ImplKind::from_code(KIND) else {
        return Status::ERR_UNKNOWN;
    };
    if out.is_null() {
        return Status::ERR_NULL_PTR;
    }
    let own = ApiVersion::new(MAJOR, MINOR);
    // SAFETY: version is null or points at the caller's request.
    let requested = unsafe { version.as_ref() }.copied().unwrap_or(ApiVersion::MIN);
    let status = accepts(kind, own, code, requested);
    if status.is_error() {
        return status;
    }
    // SAFETY: checked non-null above.
    unsafe { write_out(out, PseudoSession::new(kind, own).into_native()) }
}

unsafe extern "C" fn init_ex<const KIND: u32, const MAJOR: u16, const MINOR: u16>(
    param: *const InitParam,
    out: *mut NativeSession,
) -> Status {
    // SAFETY: param is null or a valid init block.
    let Some(param) = (unsafe { param.as_ref() }) else {
        return Status::ERR_NULL_PTR;
    };
    let mut version = param.version;
    // SAFETY: both pointers are valid for the call.
    unsafe { init::<KIND, MAJOR, MINOR>(param.implementation, &mut version, out) }
}

unsafe extern "C" fn close(session: NativeSession) -> Status {
    // SAFETY: handles come from this backend.
    let Some(s) = (unsafe { session_mut(session) }) else {
        return Status::ERR_INVALID_HANDLE;
    };
    if s.children > 0 {
        return Status::ERR_UNDEFINED_BEHAVIOR;
    }
    if let Some(parent) = s.parent.take() {
        // SAFETY: a parent cannot close while it has children.
        unsafe { (*parent).children -= 1 };
    }
    let undrained = s.encoder.as_ref().is_some_and(|e| e.buffered() > 0);
    // SAFETY: reclaim the box created in `into_native`.
    drop(unsafe { Box::from_raw(session.0.cast::<PseudoSession>()) });
    if undrained {
        Status::ERR_UNDEFINED_BEHAVIOR
    } else {
        Status::NONE
    }
}

unsafe extern "C" fn query_impl(session: NativeSession, out: *mut u32) -> Status {
    // SAFETY: handle and pointer per the backend contract.
    unsafe { with_session(session, |s| write_out(out, s.kind.code() | INTERFACES.bits())) }
}

unsafe extern "C" fn query_version(session: NativeSession, out: *mut ApiVersion) -> Status {
    // SAFETY: handle and pointer per the backend contract.
    unsafe { with_session(session, |s| write_out(out, s.version)) }
}

unsafe extern "C" fn join_session(parent: NativeSession, child: NativeSession) -> Status {
    if parent == child {
        return Status::ERR_UNDEFINED_BEHAVIOR;
    }
    // SAFETY: handles come from this backend.
    let (Some(p), Some(c)) = (unsafe { session_mut(parent) }, unsafe { session_mut(child) })
    else {
        return Status::ERR_INVALID_HANDLE;
    };
    if c.parent.is_some() || c.children > 0 {
        return Status::ERR_UNDEFINED_BEHAVIOR;
    }
    p.children += 1;
    c.parent = Some(parent.0.cast());
    Status::NONE
}

unsafe extern "C" fn disjoin_session(session: NativeSession) -> Status {
    // SAFETY: handles come from this backend.
    unsafe {
        with_session(session, |s| match s.parent.take() {
            Some(parent) => {
                (*parent).children -= 1;
                Status::NONE
            }
            None => Status::ERR_UNDEFINED_BEHAVIOR,
        })
    }
}

unsafe extern "C" fn clone_session(session: NativeSession, out: *mut NativeSession) -> Status {
    // SAFETY: handles come from this backend.
    unsafe {
        with_session(session, |s| {
            let mut clone = PseudoSession::new(s.kind, s.version);
            clone.priority = s.priority;
            write_out(out, clone.into_native())
        })
    }
}

unsafe extern "C" fn set_priority(session: NativeSession, priority: Priority) -> Status {
    if !(Priority::LOW.0..=Priority::HIGH.0).contains(&priority.0) {
        return Status::ERR_INVALID_VIDEO_PARAM;
    }
    // SAFETY: handles come from this backend.
    unsafe {
        with_session(session, |s| {
            s.priority = priority;
            Status::NONE
        })
    }
}

unsafe extern "C" fn get_priority(session: NativeSession, out: *mut Priority) -> Status {
    // SAFETY: handle and pointer per the backend contract.
    unsafe { with_session(session, |s| write_out(out, s.priority)) }
}

unsafe extern "C" fn set_frame_allocator(
    session: NativeSession,
    _allocator: *const FrameAllocator,
) -> Status {
    // SAFETY: handles come from this backend.
    unsafe { with_session(session, |_| Status::ERR_UNSUPPORTED) }
}

unsafe extern "C" fn set_handle(session: NativeSession, _ty: HandleType, _h: Handle) -> Status {
    // SAFETY: handles come from this backend.
    unsafe { with_session(session, |_| Status::ERR_UNSUPPORTED) }
}

unsafe extern "C" fn get_handle(
    session: NativeSession,
    _ty: HandleType,
    _out: *mut Handle,
) -> Status {
    // SAFETY: handles come from this backend.
    unsafe { with_session(session, |_| Status::ERR_UNSUPPORTED) }
}

unsafe extern "C" fn query_platform(session: NativeSession, _out: *mut Platform) -> Status {
    // SAFETY: handles come from this backend.
    unsafe { with_session(session, |_| Status::ERR_UNSUPPORTED) }
}

unsafe extern "C" fn sync_operation(session: NativeSession, sync: SyncPoint, wait: u32) -> Status {
    if sync.is_null() {
        return Status::ERR_NULL_PTR;
    }
    // SAFETY: handles come from this backend.
    unsafe {
        with_session(session, |s| {
            let id = sync.0.addr();
            if !s.pending_tasks.contains(&id) {
                return Status::NONE;
            }
            if wait == 0 {
                return Status::WRN_IN_EXECUTION;
            }
            s.complete_task(id);
            Status::NONE
        })
    }
}

unsafe extern "C" fn user_register(
    session: NativeSession,
    plugin_type: u32,
    plugin: PluginHandle,
) -> Status {
    // SAFETY: handles come from this backend.
    unsafe {
        with_session(session, |s| {
            if s.user_plugins.iter().any(|(ty, _)| *ty == plugin_type) {
                return Status::ERR_UNDEFINED_BEHAVIOR;
            }
            s.user_plugins.push((plugin_type, plugin));
            Status::NONE
        })
    }
}

unsafe extern "C" fn user_unregister(session: NativeSession, plugin_type: u32) -> Status {
    // SAFETY: handles come from this backend.
    unsafe {
        with_session(session, |s| {
            match s.user_plugins.iter().position(|(ty, _)| *ty == plugin_type) {
                Some(pos) => {
                    s.user_plugins.remove(pos);
                    Status::NONE
                }
                None => Status::ERR_NOT_FOUND,
            }
        })
    }
}

/// Entry points exported by the pseudo backend, excluding init.
fn common_exports() -> Vec<(VideoOp, *const c_void)> {
    vec![
        (VideoOp::Close, close as *const c_void),
        (VideoOp::QueryImpl, query_impl as *const c_void),
        (VideoOp::QueryVersion, query_version as *const c_void),
        (VideoOp::JoinSession, join_session as *const c_void),
        (VideoOp::DisjoinSession, disjoin_session as *const c_void),
        (VideoOp::CloneSession, clone_session as *const c_void),
        (VideoOp::SetPriority, set_priority as *const c_void),
        (VideoOp::GetPriority, get_priority as *const c_void),
        (VideoOp::CoreSetFrameAllocator, set_frame_allocator as *const c_void),
        (VideoOp::CoreSetHandle, set_handle as *const c_void),
        (VideoOp::CoreGetHandle, get_handle as *const c_void),
        (VideoOp::CoreSyncOperation, sync_operation as *const c_void),
        (VideoOp::CoreQueryPlatform, query_platform as *const c_void),
        (VideoOp::UserRegister, user_register as *const c_void),
        (VideoOp::UserUnregister, user_unregister as *const c_void),
        (VideoOp::EncodeQuery, encode::query as *const c_void),
        (VideoOp::EncodeQueryIoSurf, encode::query_io_surf as *const c_void),
        (VideoOp::EncodeInit, encode::init as *const c_void),
        (VideoOp::EncodeReset, encode::reset as *const c_void),
        (VideoOp::EncodeClose, encode::close as *const c_void),
        (VideoOp::EncodeGetVideoParam, encode::get_video_param as *const c_void),
        (VideoOp::EncodeFrameAsync, encode::frame_async as *const c_void),
        (VideoOp::EncodeGetEncodeStat, encode::get_encode_stat as *const c_void),
        (VideoOp::DecodeQuery, decode::query as *const c_void),
        (VideoOp::DecodeHeader, decode::header as *const c_void),
        (VideoOp::DecodeQueryIoSurf, decode::query_io_surf as *const c_void),
        (VideoOp::DecodeInit, decode::init as *const c_void),
        (VideoOp::DecodeReset, decode::reset as *const c_void),
        (VideoOp::DecodeClose, decode::close as *const c_void),
        (VideoOp::DecodeGetVideoParam, decode::get_video_param as *const c_void),
        (VideoOp::DecodeGetDecodeStat, decode::get_decode_stat as *const c_void),
        (VideoOp::DecodeSetSkipMode, decode::set_skip_mode as *const c_void),
        (VideoOp::DecodeGetPayload, decode::get_payload as *const c_void),
        (VideoOp::DecodeFrameAsync, decode::frame_async as *const c_void),
        (VideoOp::VppQuery, vpp::query as *const c_void),
        (VideoOp::VppQueryIoSurf, vpp::query_io_surf as *const c_void),
        (VideoOp::VppInit, vpp::init as *const c_void),
        (VideoOp::VppReset, vpp::reset as *const c_void),
        (VideoOp::VppClose, vpp::close as *const c_void),
        (VideoOp::VppGetVideoParam, vpp::get_video_param as *const c_void),
        (VideoOp::VppGetVppStat, vpp::get_vpp_stat as *const c_void),
        (VideoOp::VppRunFrameAsync, vpp::run_frame_async as *const c_void),
    ]
}

/// A pseudo backend reporting kind code `KIND` and API `MAJOR.MINOR`.
///
/// Exports every video operation except the surface-borrowing ones, and
/// nothing from the plugin or audio families.
pub fn module<const KIND: u32, const MAJOR: u16, const MINOR: u16>(
    name: impl Into<String>,
) -> StaticModule {
    let module = StaticModule::new(name)
        .export(
            VideoOp::Init.symbol(),
            init::<KIND, MAJOR, MINOR> as *const c_void,
        )
        .export(
            VideoOp::InitEx.symbol(),
            init_ex::<KIND, MAJOR, MINOR> as *const c_void,
        );
    common_exports()
        .into_iter()
        .fold(module, |module, (op, entry)| module.export(op.symbol(), entry))
}

/// Pseudo backend at the current API version.
pub fn pseudo_module() -> StaticModule {
    module::<{ ImplKind::Pseudo.code() }, 2, 2>("pseudo")
}

/// The pseudo backend standing in for a software implementation.
pub fn software_module() -> StaticModule {
    module::<{ ImplKind::Software.code() }, 2, 2>("pseudo-software")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::{CloseFn, InitFn, QueryImplFn, QueryVersionFn, SyncOperationFn};
    use crate::backend::{FunctionTable, SymbolSource};

    fn open(code: u32, version: ApiVersion) -> (StaticModule, NativeSession, Status) {
        let module = module::<{ ImplKind::Software.code() }, 2, 1>("test-sw");
        let table = FunctionTable::<VideoOp>::build(&module, ApiVersion::CURRENT);
        let init: InitFn = unsafe { table.get(VideoOp::Init) }.unwrap();
        let mut version = version;
        let mut session = NativeSession::NULL;
        let status = unsafe { init(code, &mut version, &mut session) };
        (module, session, status)
    }

    #[test]
    fn test_init_reports_identity() {
        let (module, session, status) = open(0, ApiVersion::new(1, 0));
        assert_eq!(status, Status::NONE);
        assert!(!session.is_null());

        let table = FunctionTable::<VideoOp>::build(&module, ApiVersion::CURRENT);
        let query_impl: QueryImplFn = unsafe { table.get(VideoOp::QueryImpl) }.unwrap();
        let query_version: QueryVersionFn = unsafe { table.get(VideoOp::QueryVersion) }.unwrap();
        let close: CloseFn = unsafe { table.get(VideoOp::Close) }.unwrap();

        let mut code = 0;
        let mut version = ApiVersion::default();
        unsafe {
            assert_eq!(query_impl(session, &mut code), Status::NONE);
            assert_eq!(query_version(session, &mut version), Status::NONE);
            assert_eq!(close(session), Status::NONE);
        }
        assert_eq!(ImplKind::from_code(code), Some(ImplKind::Software));
        assert_eq!(version, ApiVersion::new(2, 1));
    }

    #[test]
    fn test_init_rejects_mismatch() {
        let (_, _, status) = open(ImplKind::Hardware.code(), ApiVersion::new(1, 0));
        assert_eq!(status, Status::ERR_UNSUPPORTED);

        let (_, _, status) = open(0, ApiVersion::new(2, 2));
        assert_eq!(status, Status::ERR_UNSUPPORTED);

        let (_, _, status) = open(InterfaceFlags::D3D11.bits(), ApiVersion::new(1, 0));
        assert_eq!(status, Status::ERR_UNSUPPORTED);
    }

    #[test]
    fn test_sync_poll_then_wait() {
        let mut session = PseudoSession::new(ImplKind::Pseudo, ApiVersion::CURRENT);
        let sync = session.submit_task(1);
        let native = session.into_native();
        let module = pseudo_module();
        let sync_op: SyncOperationFn =
            unsafe { module.resolve(VideoOp::CoreSyncOperation.symbol()).unwrap().cast() };

        unsafe {
            assert_eq!(sync_op(native, sync, 0), Status::WRN_IN_EXECUTION);
            assert_eq!(sync_op(native, sync, 0), Status::WRN_IN_EXECUTION);
            assert_eq!(sync_op(native, sync, 10), Status::NONE);
            assert_eq!(sync_op(native, sync, 0), Status::NONE);
            assert_eq!(sync_op(native, SyncPoint::NULL, 0), Status::ERR_NULL_PTR);
            assert_eq!(close(native), Status::NONE);
        }
    }

    #[test]
    fn test_unsynced_tasks_stay_bounded() {
        let mut session = PseudoSession::new(ImplKind::Pseudo, ApiVersion::CURRENT);
        let first = session.submit_task(4);
        let last = (0..1000).map(|_| session.submit_task(4)).last().unwrap();
        assert_eq!(session.pending_tasks.len(), 4);
        assert!(!session.pending_tasks.contains(&first.0.addr()));
        assert!(session.pending_tasks.contains(&last.0.addr()));

        // Depth zero behaves as one.
        let only = session.submit_task(0);
        assert_eq!(session.pending_tasks.len(), 1);
        assert!(session.complete_task(only.0.addr()));
        assert!(!session.complete_task(only.0.addr()));
        assert!(session.pending_tasks.is_empty());
    }

    #[test]
    fn test_surface_ops_not_exported() {
        let module = pseudo_module();
        assert!(module.resolve(VideoOp::MemoryGetSurfaceForEncode.symbol()).is_none());
        assert!(module.resolve(VideoOp::InitEx.symbol()).is_some());
    }
}
