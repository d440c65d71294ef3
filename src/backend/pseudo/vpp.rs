//! Pseudo VPP: copies frames from input to output.

use super::{session_mut, with_session, write_out};
use crate::abi::{
    FrameAllocRequest, FrameInfo, FrameSurface, NativeSession, SyncPoint, VideoParam, VppStat,
    fourcc, io_pattern,
};
use crate::status::Status;

const MAX_DIMENSION: u16 = 8192;
const SUGGESTED_SURFACES: u16 = 3;

fn check_side(info: &mut FrameInfo) -> bool {
    if info.fourcc == 0 {
        info.fourcc = fourcc::I420;
    }
    if info.frame_rate_n == 0 {
        info.frame_rate_n = 30;
    }
    if info.frame_rate_d == 0 {
        info.frame_rate_d = 1;
    }
    matches!(info.fourcc, fourcc::I420 | fourcc::I010)
        && (1..=MAX_DIMENSION).contains(&info.width)
        && (1..=MAX_DIMENSION).contains(&info.height)
}

fn validate(par: &mut VideoParam) -> Status {
    if par.io_pattern == 0 {
        par.io_pattern = io_pattern::IN_SYSTEM_MEMORY | io_pattern::OUT_SYSTEM_MEMORY;
    }
    if par.async_depth == 0 {
        par.async_depth = 1;
    }
    if check_side(&mut par.vpp_in) && check_side(&mut par.vpp_out) {
        Status::NONE
    } else {
        Status::ERR_INVALID_VIDEO_PARAM
    }
}

/// VPP state of one session.
pub(super) struct Vpp {
    params: VideoParam,
    stat: VppStat,
}

pub(super) unsafe extern "C" fn query(
    session: NativeSession,
    input: *const VideoParam,
    out: *mut VideoParam,
) -> Status {
    // SAFETY: handles and pointers per the backend contract.
    unsafe {
        with_session(session, |_| {
            let Some(input) = input.as_ref().copied() else {
                let mut par = VideoParam {
                    io_pattern: 1,
                    async_depth: 1,
                    ..Default::default()
                };
                for side in [&mut par.vpp_in, &mut par.vpp_out] {
                    side.fourcc = 1;
                    side.width = 1;
                    side.height = 1;
                }
                return write_out(out, par);
            };
            if out.is_null() {
                return Status::ERR_NULL_PTR;
            }
            let mut checked = input;
            let status = validate(&mut checked);
            out.write(if status.is_error() { input } else { checked });
            status
        })
    }
}

/// Writes two requests: input then output.
pub(super) unsafe extern "C" fn query_io_surf(
    session: NativeSession,
    par: *const VideoParam,
    request: *mut FrameAllocRequest,
) -> Status {
    // SAFETY: handles and pointers per the backend contract; `request`
    // points at two consecutive entries.
    unsafe {
        with_session(session, |_| {
            let Some(mut par) = par.as_ref().copied() else {
                return Status::ERR_NULL_PTR;
            };
            if request.is_null() {
                return Status::ERR_NULL_PTR;
            }
            let status = validate(&mut par);
            if status.is_error() {
                return status;
            }
            let sides = [
                (par.vpp_in, io_pattern::IN_SYSTEM_MEMORY),
                (par.vpp_out, io_pattern::OUT_SYSTEM_MEMORY),
            ];
            for (i, (info, memory_type)) in sides.into_iter().enumerate() {
                request.add(i).write(FrameAllocRequest {
                    info,
                    memory_type,
                    num_frame_min: SUGGESTED_SURFACES,
                    num_frame_suggested: SUGGESTED_SURFACES,
                });
            }
            Status::NONE
        })
    }
}

pub(super) unsafe extern "C" fn init(session: NativeSession, par: *const VideoParam) -> Status {
    // SAFETY: handles and pointers per the backend contract.
    unsafe {
        with_session(session, |s| {
            let Some(mut par) = par.as_ref().copied() else {
                return Status::ERR_NULL_PTR;
            };
            if s.vpp.is_some() {
                return Status::ERR_UNDEFINED_BEHAVIOR;
            }
            let status = validate(&mut par);
            if status.is_error() {
                return status;
            }
            s.vpp = Some(Vpp {
                params: par,
                stat: VppStat::default(),
            });
            Status::NONE
        })
    }
}

pub(super) unsafe extern "C" fn reset(session: NativeSession, par: *const VideoParam) -> Status {
    // SAFETY: handles and pointers per the backend contract.
    unsafe {
        with_session(session, |s| {
            let Some(mut par) = par.as_ref().copied() else {
                return Status::ERR_NULL_PTR;
            };
            let Some(vpp) = s.vpp.as_mut() else {
                return Status::ERR_NOT_INITIALIZED;
            };
            let status = validate(&mut par);
            if status.is_error() {
                return status;
            }
            vpp.params = par;
            Status::NONE
        })
    }
}

pub(super) unsafe extern "C" fn close(session: NativeSession) -> Status {
    // SAFETY: handles come from this backend.
    unsafe {
        with_session(session, |s| match s.vpp.take() {
            Some(_) => Status::NONE,
            None => Status::ERR_NOT_INITIALIZED,
        })
    }
}

pub(super) unsafe extern "C" fn get_video_param(
    session: NativeSession,
    out: *mut VideoParam,
) -> Status {
    // SAFETY: handles and pointers per the backend contract.
    unsafe {
        with_session(session, |s| match &s.vpp {
            Some(vpp) => write_out(out, vpp.params),
            None => Status::ERR_NOT_INITIALIZED,
        })
    }
}

pub(super) unsafe extern "C" fn get_vpp_stat(session: NativeSession, out: *mut VppStat) -> Status {
    // SAFETY: handles and pointers per the backend contract.
    unsafe {
        with_session(session, |s| match &s.vpp {
            Some(vpp) => write_out(out, vpp.stat),
            None => Status::ERR_NOT_INITIALIZED,
        })
    }
}

pub(super) unsafe extern "C" fn run_frame_async(
    session: NativeSession,
    input: *mut FrameSurface<'_>,
    output: *mut FrameSurface<'_>,
    sync: *mut SyncPoint,
) -> Status {
    // SAFETY: handles come from this backend.
    let Some(s) = (unsafe { session_mut(session) }) else {
        return Status::ERR_INVALID_HANDLE;
    };
    // SAFETY: output surface is null or valid for the call.
    let Some(output) = (unsafe { output.as_mut() }) else {
        return Status::ERR_NULL_PTR;
    };
    if sync.is_null() || output.is_null() {
        return Status::ERR_NULL_PTR;
    }
    let Some(vpp) = s.vpp.as_mut() else {
        return Status::ERR_NOT_INITIALIZED;
    };
    // SAFETY: a null input asks to drain; nothing is buffered.
    let Some(input) = (unsafe { input.as_ref() }) else {
        return Status::ERR_MORE_DATA;
    };
    if input.is_null() {
        return Status::ERR_NULL_PTR;
    }

    let len = input.data_len().min(output.data_len());
    // SAFETY: both surfaces hold at least `len` bytes; distinct surfaces
    // never alias and `copy` tolerates in-place processing.
    unsafe { std::ptr::copy(input.as_ptr(), output.as_mut_ptr(), len) };
    output.info = vpp.params.vpp_out;
    output.timestamp = input.timestamp;
    output.frame_order = vpp.stat.num_frame;
    vpp.stat.num_frame += 1;
    let depth = vpp.params.async_depth;

    let token = s.submit_task(depth);
    // SAFETY: checked non-null above.
    unsafe { sync.write(token) };
    Status::NONE
}
