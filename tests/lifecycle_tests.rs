//! Integration tests for session lifecycle: init, clone, join, priority,
//! close.

mod common;

use common::*;
use metrics::{
    Counter, Gauge, GaugeFn, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit,
};
use mxdispatch::abi::{Bitstream, FrameSurface, ImplKind, InterfaceFlags, Priority, VideoParam};
use mxdispatch::backend::{StaticModule, pseudo};
use mxdispatch::catalog::ImplDescriptor;
use mxdispatch::config::DispatchConfig;
use mxdispatch::context::DispatchContext;
use mxdispatch::error::Error;
use mxdispatch::ops::{Operation, VideoOp};
use mxdispatch::session::{InitParams, Session, SessionState};
use mxdispatch::status::Status;
use mxdispatch::version::ApiVersion;
use parking_lot::Mutex;
use std::sync::Arc;

// ============================================================================
// Init
// ============================================================================

#[test]
fn test_first_satisfying_candidate_wins() {
    let context = hw_sw_context();
    let session = Session::open(&context, InitParams::new(ApiVersion::new(2, 1))).unwrap();

    assert_eq!(session.state(), SessionState::Ready);
    assert_eq!(session.kind(), Some(ImplKind::Software));
    assert_eq!(session.backend_name(), Some("sw-2.1"));
    assert_eq!(session.actual_version(), Some(ApiVersion::new(2, 1)));
    assert_eq!(session.query_version().unwrap(), ApiVersion::new(2, 1));
    assert_eq!(session.required_version(), ApiVersion::new(2, 1));
}

#[test]
fn test_catalog_order_decides_between_satisfying_candidates() {
    let context = hw_sw_context();
    let session = Session::open(&context, InitParams::new(ApiVersion::new(1, 0))).unwrap();
    assert_eq!(session.kind(), Some(ImplKind::Hardware));
    assert_eq!(session.actual_version(), Some(ApiVersion::new(2, 0)));
}

#[test]
fn test_kind_restriction() {
    let context = hw_sw_context();
    // Hardware is listed first and satisfies 2.0, but the kind rules it out.
    let session = Session::open(
        &context,
        InitParams::new(ApiVersion::new(2, 0)).with_kind(ImplKind::Software),
    )
    .unwrap();
    assert_eq!(session.kind(), Some(ImplKind::Software));
    assert_eq!(session.backend_name(), Some("sw-2.1"));
    assert_eq!(session.actual_version(), Some(ApiVersion::new(2, 1)));
    assert_eq!(session.required_version(), ApiVersion::new(2, 0));

    let err = Session::open(
        &context,
        InitParams::new(ApiVersion::new(1, 0)).with_kind(ImplKind::Pseudo),
    )
    .unwrap_err();
    assert_eq!(
        err,
        Error::NoMatchingImplementation {
            kind: Some(ImplKind::Pseudo),
            version: ApiVersion::new(1, 0),
        }
    );
}

#[test]
fn test_interfaces_checked_by_backend() {
    let context = pseudo_context();
    let session = Session::open(
        &context,
        InitParams::new(ApiVersion::new(2, 0)).with_interfaces(InterfaceFlags::SYSTEM_MEMORY),
    )
    .unwrap();
    assert_eq!(session.interfaces(), Some(pseudo::INTERFACES));

    let err = Session::open(
        &context,
        InitParams::new(ApiVersion::new(2, 0)).with_interfaces(InterfaceFlags::VAAPI),
    )
    .unwrap_err();
    assert!(matches!(err, Error::NoMatchingImplementation { .. }));
}

#[test]
fn test_empty_catalog() {
    init_tracing();
    let context = DispatchContext::new();
    let mut session = Session::new(&context);

    let err = session.init(InitParams::new(ApiVersion::new(1, 0))).unwrap_err();
    assert!(matches!(err, Error::NoMatchingImplementation { kind: None, .. }));
    assert_eq!(err.status(), Status::ERR_UNSUPPORTED);
    assert_eq!(session.state(), SessionState::Uninitialized);

    // A failed init leaves the session reusable.
    context.add_backend(0, ImplDescriptor::builtin(pseudo::pseudo_module(), ImplKind::Pseudo));
    session.init(InitParams::new(ApiVersion::new(1, 0))).unwrap();
    assert_eq!(session.state(), SessionState::Ready);
}

#[test]
fn test_version_above_every_backend() {
    let context = hw_sw_context();
    let err = Session::open(&context, InitParams::new(ApiVersion::new(2, 2))).unwrap_err();
    assert!(matches!(err, Error::NoMatchingImplementation { .. }));
}

#[test]
fn test_candidate_missing_required_entry_is_skipped() {
    init_tracing();
    let context = DispatchContext::new();
    let broken = pseudo::module::<{ ImplKind::Hardware.code() }, 2, 2>("no-query-version")
        .without(VideoOp::QueryVersion.symbol());
    context.add_backend(0, ImplDescriptor::builtin(broken, ImplKind::Hardware));
    context.add_backend(1, ImplDescriptor::builtin(pseudo::software_module(), ImplKind::Software));

    let session = Session::open(&context, InitParams::new(ApiVersion::new(1, 0))).unwrap();
    assert_eq!(session.backend_name(), Some("pseudo-software"));
}

#[test]
fn test_candidate_without_any_init_is_skipped() {
    init_tracing();
    let context = DispatchContext::new();
    let inert = pseudo::pseudo_module()
        .named("inert")
        .without(VideoOp::Init.symbol())
        .without(VideoOp::InitEx.symbol());
    context.add_backend(0, ImplDescriptor::builtin(inert, ImplKind::Pseudo));
    context.add_backend(1, ImplDescriptor::builtin(pseudo::pseudo_module(), ImplKind::Pseudo));

    let session = Session::open(&context, InitParams::new(ApiVersion::new(1, 0))).unwrap();
    assert_eq!(session.backend_name(), Some("pseudo"));
}

#[test]
fn test_declared_version_prefilters() {
    init_tracing();
    let context = DispatchContext::new();
    context.add_backend(
        0,
        ImplDescriptor::builtin(StaticModule::new("old"), ImplKind::Hardware)
            .with_version(ApiVersion::new(1, 19)),
    );
    context.add_backend(1, ImplDescriptor::builtin(pseudo::software_module(), ImplKind::Software));

    let session = Session::open(&context, InitParams::new(ApiVersion::new(2, 0))).unwrap();
    assert_eq!(session.kind(), Some(ImplKind::Software));
}

#[test]
fn test_init_twice() {
    let context = pseudo_context();
    let mut session = Session::open(&context, InitParams::default()).unwrap();
    assert_eq!(
        session.init(InitParams::default()),
        Err(Error::UndefinedBehavior)
    );
    assert_eq!(session.state(), SessionState::Ready);
}

#[test]
fn test_init_through_legacy_entry() {
    init_tracing();
    let context = DispatchContext::new();
    let legacy = pseudo::pseudo_module()
        .named("legacy")
        .without(VideoOp::InitEx.symbol());
    context.add_backend(0, ImplDescriptor::builtin(legacy, ImplKind::Pseudo));

    let session = Session::open(&context, InitParams::new(ApiVersion::new(1, 1))).unwrap();
    assert_eq!(session.backend_name(), Some("legacy"));
    assert_eq!(session.load_status(), Some(Status::NONE));
}

// ============================================================================
// State checks
// ============================================================================

#[test]
fn test_calls_before_init_and_after_close() {
    let context = pseudo_context();
    let mut session = Session::new(&context);
    let mut out = VideoParam::default();

    assert_eq!(session.encode_query(None, &mut out), Err(Error::NotInitialized));
    assert_eq!(session.query_version(), Err(Error::NotInitialized));
    assert!(!session.is_available(VideoOp::EncodeInit));

    session.init(InitParams::new(ApiVersion::new(2, 0))).unwrap();
    assert!(session.encode_query(None, &mut out).is_ok());

    session.close().unwrap();
    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(session.encode_query(None, &mut out), Err(Error::InvalidHandle));
    assert_eq!(session.query_impl(), Err(Error::InvalidHandle));
    assert_eq!(session.init(InitParams::default()), Err(Error::InvalidHandle));
}

#[test]
fn test_double_close() {
    let context = pseudo_context();
    let mut session = Session::open(&context, InitParams::default()).unwrap();
    assert_eq!(session.close(), Ok(Status::NONE));
    assert_eq!(session.close(), Err(Error::AlreadyClosed));
    assert_eq!(Error::AlreadyClosed.status(), Status::ERR_INVALID_HANDLE);
}

#[test]
fn test_close_uninitialized() {
    let context = pseudo_context();
    let mut session = Session::new(&context);
    assert_eq!(session.close(), Ok(Status::NONE));
    assert_eq!(session.state(), SessionState::Closed);
}

// ============================================================================
// Clone
// ============================================================================

#[test]
fn test_clone_is_independent() {
    let context = pseudo_context();
    let mut session = Session::open(&context, InitParams::new(ApiVersion::new(2, 0))).unwrap();
    let mut clone = session.clone_session().unwrap();

    assert_ne!(clone.id(), session.id());
    assert_eq!(clone.backend_name(), session.backend_name());
    assert_eq!(clone.actual_version(), session.actual_version());
    assert!(!clone.is_joined());

    let input = avc(320, 240);
    let mut par = VideoParam::default();
    session.encode_query(Some(&input), &mut par).unwrap();
    session.encode_init(&par).unwrap();

    // The clone has no encoder of its own.
    let mut out = VideoParam::default();
    assert_eq!(
        clone.encode_get_video_param(&mut out),
        Err(Error::NotInitialized)
    );

    clone.close().unwrap();
    session.encode_get_video_param(&mut out).unwrap();
    assert_eq!(out.frame_info.width, 320);
    session.close().unwrap();
}

#[test]
fn test_clone_without_backend_clone_entry() {
    init_tracing();
    let context = DispatchContext::new();
    let module = pseudo::pseudo_module().without(VideoOp::CloneSession.symbol());
    context.add_backend(0, ImplDescriptor::builtin(module, ImplKind::Pseudo));

    let session = Session::open(&context, InitParams::new(ApiVersion::new(2, 0))).unwrap();
    let clone = session.clone_session().unwrap();
    assert_eq!(clone.state(), SessionState::Ready);
    assert_eq!(clone.query_version().unwrap(), ApiVersion::new(2, 2));
}

// ============================================================================
// Join
// ============================================================================

#[test]
fn test_join_blocks_parent_close() {
    let context = pseudo_context();
    let mut parent = Session::open(&context, InitParams::default()).unwrap();
    let mut child = parent.clone_session().unwrap();

    parent.join(&mut child).unwrap();
    assert!(child.is_joined());
    assert_eq!(parent.joined_children(), 1);

    assert_eq!(parent.close(), Err(Error::JoinedChildren(1)));
    assert_eq!(parent.state(), SessionState::Ready);

    child.disjoin().unwrap();
    assert!(!child.is_joined());
    assert_eq!(parent.joined_children(), 0);
    parent.close().unwrap();
    child.close().unwrap();
}

/// Tracks `mxdispatch_sessions_active` for sessions opened inside
/// `with_local_recorder`.
#[derive(Default)]
struct ActiveSessions(Arc<ActiveGauge>);

#[derive(Default)]
struct ActiveGauge(Mutex<f64>);

impl GaugeFn for ActiveGauge {
    fn increment(&self, value: f64) {
        *self.0.lock() += value;
    }

    fn decrement(&self, value: f64) {
        *self.0.lock() -= value;
    }

    fn set(&self, value: f64) {
        *self.0.lock() = value;
    }
}

impl Recorder for ActiveSessions {
    fn describe_counter(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
    fn describe_gauge(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
    fn describe_histogram(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

    fn register_counter(&self, _: &Key, _: &Metadata<'_>) -> Counter {
        Counter::noop()
    }

    fn register_gauge(&self, key: &Key, _: &Metadata<'_>) -> Gauge {
        if key.name() == "mxdispatch_sessions_active" {
            Gauge::from_arc(self.0.clone())
        } else {
            Gauge::noop()
        }
    }

    fn register_histogram(&self, _: &Key, _: &Metadata<'_>) -> Histogram {
        Histogram::noop()
    }
}

#[test]
fn test_dropping_joined_parent_keeps_active_count() {
    let recorder = ActiveSessions::default();
    let context = pseudo_context();

    metrics::with_local_recorder(&recorder, || {
        let mut parent = Session::open(&context, InitParams::default()).unwrap();
        let mut child = Session::open(&context, InitParams::default()).unwrap();
        parent.join(&mut child).unwrap();
        assert_eq!(*recorder.0.0.lock(), 2.0);

        // The parent's native session is leaked, but it no longer counts.
        drop(parent);
        assert_eq!(*recorder.0.0.lock(), 1.0);

        // The child still runs on the leaked native session.
        assert_eq!(child.query_impl().map(ImplKind::from_code), Ok(Some(ImplKind::Pseudo)));
        child.close().unwrap();
        assert_eq!(*recorder.0.0.lock(), 0.0);
    });
}

#[test]
fn test_closing_joined_child_disjoins() {
    let context = pseudo_context();
    let mut parent = Session::open(&context, InitParams::default()).unwrap();
    let mut child = Session::open(&context, InitParams::default()).unwrap();

    parent.join(&mut child).unwrap();
    child.close().unwrap();
    assert_eq!(parent.joined_children(), 0);
    parent.close().unwrap();
}

#[test]
fn test_join_rules() {
    let context = hw_sw_context();
    let mut hw = Session::open(&context, InitParams::default().with_kind(ImplKind::Hardware))
        .unwrap();
    let mut sw = Session::open(&context, InitParams::default().with_kind(ImplKind::Software))
        .unwrap();
    assert_eq!(hw.join(&mut sw), Err(Error::Unsupported));

    let mut a = hw.clone_session().unwrap();
    let mut b = hw.clone_session().unwrap();
    hw.join(&mut a).unwrap();
    // Already joined.
    assert_eq!(b.join(&mut a), Err(Error::UndefinedBehavior));
    // Has children of its own.
    assert_eq!(b.join(&mut hw), Err(Error::UndefinedBehavior));

    let mut unbound = Session::new(&context);
    assert_eq!(hw.join(&mut unbound), Err(Error::NotInitialized));

    a.disjoin().unwrap();
    // Disjoining an unjoined session is a no-op.
    assert_eq!(a.disjoin(), Ok(Status::NONE));
}

// ============================================================================
// Priority
// ============================================================================

#[test]
fn test_priority_hint_applies_at_init() {
    let context = pseudo_context();
    let early = Session::open(&context, InitParams::default()).unwrap();
    assert_eq!(early.backend_priority().unwrap(), Priority::NORMAL);

    early.set_priority(Priority::HIGH).unwrap();
    assert_eq!(early.get_priority().unwrap(), Priority::HIGH);
    // Already-bound sessions keep what they were created with.
    assert_eq!(early.backend_priority().unwrap(), Priority::NORMAL);

    let late = Session::open(&context, InitParams::default()).unwrap();
    assert_eq!(late.backend_priority().unwrap(), Priority::HIGH);
}

#[test]
fn test_priority_validation() {
    let context = pseudo_context();
    let mut session = Session::new(&context);
    assert_eq!(session.set_priority(Priority(3)), Err(Error::InvalidParameter));
    assert_eq!(session.set_priority(Priority(-1)), Err(Error::InvalidParameter));
    session.set_priority(Priority::LOW).unwrap();
    assert_eq!(context.priority(), Priority::LOW);

    session.close().unwrap();
    assert_eq!(session.set_priority(Priority::LOW), Err(Error::InvalidHandle));
    assert_eq!(session.get_priority(), Err(Error::InvalidHandle));
}

// ============================================================================
// Close ordering
// ============================================================================

fn start_buffering_encoder(session: &mut Session, buffered: u16) -> VideoParam {
    let mut par = avc(64, 64);
    par.gop_ref_dist = buffered + 1;
    let input = par;
    session.encode_query(Some(&input), &mut par).unwrap();
    session.encode_init(&par).unwrap();

    let mut out = vec![0u8; 1 << 16];
    for seed in 0..buffered {
        let mut pixels = frame_bytes(&par.frame_info, seed as u8);
        let mut surface = FrameSurface::from_slice(par.frame_info, &mut pixels);
        let mut bs = Bitstream::from_slice(&mut out);
        assert_eq!(
            session.encode_frame_async(None, Some(&mut surface), &mut bs),
            Err(Error::MoreData)
        );
    }
    par
}

#[test]
fn test_close_drains_encoder() {
    let context = pseudo_context();
    let mut session = Session::open(&context, InitParams::new(ApiVersion::new(2, 0))).unwrap();
    start_buffering_encoder(&mut session, 3);
    assert_eq!(session.encode_get_encode_stat().unwrap().num_cached_frame, 3);

    // The pseudo backend refuses to close an undrained encoder, so a clean
    // close shows the frames were flushed first.
    assert_eq!(session.close(), Ok(Status::NONE));
}

#[test]
fn test_close_continues_after_failed_step() {
    init_tracing();
    let config = DispatchConfig::default()
        .with_drain_buffer_size(64)
        .with_max_drain_buffer_size(1024);
    let context = unsafe { DispatchContext::from_config(config) };
    context.add_backend(0, ImplDescriptor::builtin(pseudo::pseudo_module(), ImplKind::Pseudo));

    let mut session = Session::open(&context, InitParams::new(ApiVersion::new(2, 0))).unwrap();
    start_buffering_encoder(&mut session, 2);

    // Packets of a 64x64 frame never fit the capped drain buffer.
    assert_eq!(session.close(), Err(Error::NotEnoughBuffer));
    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(session.close(), Err(Error::AlreadyClosed));
}

#[test]
fn test_drop_closes_session() {
    let context = pseudo_context();
    let mut session = Session::open(&context, InitParams::new(ApiVersion::new(2, 0))).unwrap();
    start_buffering_encoder(&mut session, 1);
    drop(session);

    let again = Session::open(&context, InitParams::new(ApiVersion::new(2, 0))).unwrap();
    assert_eq!(again.state(), SessionState::Ready);
}

#[test]
fn test_session_is_send() {
    fn assert_send<T: Send>() {}
    assert_send::<Session>();
}
