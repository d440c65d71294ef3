//! Shared helpers for the integration tests.

#![allow(dead_code)]

use mxdispatch::abi::{
    AudioFrame, AudioParam, Bitstream, FrameInfo, ImplKind, NativeSession, SyncPoint, VideoParam,
    codec,
};
use mxdispatch::backend::{StaticModule, pseudo};
use mxdispatch::catalog::ImplDescriptor;
use mxdispatch::context::DispatchContext;
use mxdispatch::ops::{AudioOp, Operation};
use mxdispatch::status::Status;
use std::ffi::c_void;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Once;

/// Install a test subscriber once; honours `RUST_LOG`.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// A context holding only the built-in pseudo backend.
pub fn pseudo_context() -> Arc<DispatchContext> {
    init_tracing();
    DispatchContext::with_pseudo_backend()
}

/// Hardware backend at API 2.0 and software backend at 2.1, hardware
/// listed first.
pub fn hw_sw_context() -> Arc<DispatchContext> {
    init_tracing();
    let context = DispatchContext::new();
    context.add_backend(
        0,
        ImplDescriptor::builtin(
            pseudo::module::<{ ImplKind::Hardware.code() }, 2, 0>("hw-2.0"),
            ImplKind::Hardware,
        ),
    );
    context.add_backend(
        10,
        ImplDescriptor::builtin(
            pseudo::module::<{ ImplKind::Software.code() }, 2, 1>("sw-2.1"),
            ImplKind::Software,
        ),
    );
    context
}

/// AVC encoder parameters, everything else left for Query to fill.
pub fn avc(width: u16, height: u16) -> VideoParam {
    VideoParam {
        codec_id: codec::AVC,
        frame_info: FrameInfo {
            width,
            height,
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Storage for one I420 frame filled with `seed`.
pub fn frame_bytes(info: &FrameInfo, seed: u8) -> Vec<u8> {
    (0..info.frame_size()).map(|i| seed.wrapping_add(i as u8)).collect()
}

// Audio stubs: counters instead of codecs. Registered on top of a pseudo
// module so sessions can exercise the audio table.

pub static AUDIO_ENCODE_CLOSES: AtomicUsize = AtomicUsize::new(0);
pub static AUDIO_DECODE_CLOSES: AtomicUsize = AtomicUsize::new(0);

unsafe extern "C" fn audio_init(_s: NativeSession, par: *const AudioParam) -> Status {
    if par.is_null() {
        return Status::ERR_NULL_PTR;
    }
    Status::NONE
}

unsafe extern "C" fn audio_encode_close(_s: NativeSession) -> Status {
    AUDIO_ENCODE_CLOSES.fetch_add(1, Ordering::SeqCst);
    Status::NONE
}

unsafe extern "C" fn audio_decode_close(_s: NativeSession) -> Status {
    AUDIO_DECODE_CLOSES.fetch_add(1, Ordering::SeqCst);
    Status::NONE
}

unsafe extern "C" fn audio_query(
    _s: NativeSession,
    input: *const AudioParam,
    out: *mut AudioParam,
) -> Status {
    if out.is_null() {
        return Status::ERR_NULL_PTR;
    }
    // SAFETY: pointers per the backend contract.
    unsafe {
        let mut par = input.as_ref().copied().unwrap_or_default();
        if par.sample_frequency == 0 {
            par.sample_frequency = 48_000;
        }
        if par.num_channel == 0 {
            par.num_channel = 2;
        }
        out.write(par);
    }
    Status::NONE
}

/// Copies the frame's samples into the bitstream.
unsafe extern "C" fn audio_encode_frame(
    _s: NativeSession,
    frame: *mut AudioFrame<'_>,
    bs: *mut Bitstream<'_>,
    sync: *mut SyncPoint,
) -> Status {
    // SAFETY: pointers per the backend contract.
    unsafe {
        let (Some(frame), Some(bs)) = (frame.as_ref(), bs.as_mut()) else {
            return Status::ERR_NULL_PTR;
        };
        let samples = frame.as_bytes();
        let spare = bs.spare_capacity_mut();
        let len = samples.len().min(spare.len());
        spare[..len].copy_from_slice(&samples[..len]);
        bs.commit(len);
        sync.write(SyncPoint::NULL);
    }
    Status::NONE
}

/// A software pseudo backend that also exports a minimal audio family.
pub fn audio_module() -> StaticModule {
    pseudo::module::<{ ImplKind::Software.code() }, 2, 2>("sw-audio")
        .export(AudioOp::EncodeQuery.symbol(), audio_query as *const c_void)
        .export(AudioOp::EncodeInit.symbol(), audio_init as *const c_void)
        .export(AudioOp::EncodeClose.symbol(), audio_encode_close as *const c_void)
        .export(AudioOp::EncodeFrameAsync.symbol(), audio_encode_frame as *const c_void)
        .export(AudioOp::DecodeInit.symbol(), audio_init as *const c_void)
        .export(AudioOp::DecodeClose.symbol(), audio_decode_close as *const c_void)
}

/// A context whose only backend is [`audio_module`].
pub fn audio_context() -> Arc<DispatchContext> {
    init_tracing();
    let context = DispatchContext::new();
    context.add_backend(0, ImplDescriptor::builtin(audio_module(), ImplKind::Software));
    context
}
