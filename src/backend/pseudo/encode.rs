//! Pseudo encoder with software-encoder parameter validation.

use super::{session_mut, with_session, write_out};
use crate::abi::{
    Bitstream, EncodeCtrl, EncodeStat, FrameAllocRequest, FrameSurface, NativeSession, SyncPoint,
    VideoParam, codec, fourcc, gop, io_pattern, level, profile, rate_control, target_usage,
};
use crate::status::Status;
use std::collections::VecDeque;
use std::ops::RangeInclusive;

/// Magic bytes opening every pseudo packet.
pub const PACKET_MAGIC: [u8; 4] = *b"MXPF";

/// Size of the pseudo packet header: magic, codec, width, height, length.
pub const PACKET_HEADER_LEN: usize = 16;

const DEFAULT_TARGET_KBPS: u16 = 4000;
const DEFAULT_FRAME_RATE: (u32, u32) = (30, 1);
const MAX_FRAME_RATE_PART: u32 = 65535;
const DEFAULT_JPEG_QUALITY: u16 = 80;
const DEFAULT_GOP_PIC_SIZE: u16 = 30;
const MAX_GOP_REF_DIST: u16 = 16;
const SUGGESTED_SURFACES: u16 = 3;

/// Limits of one codec.
struct CodecLimits {
    codec: u32,
    width: RangeInclusive<u16>,
    height: RangeInclusive<u16>,
    /// Empty for codecs driven by `quality` instead of bitrate.
    rate_controls: &'static [u16],
    max_qp: u16,
    profiles: &'static [u16],
    default_profile: u16,
    /// Empty when the codec has no level signalling.
    levels: &'static [u16],
}

const CODECS: &[CodecLimits] = &[
    CodecLimits {
        codec: codec::AVC,
        width: 64..=4096,
        height: 64..=2304,
        rate_controls: &[rate_control::CQP, rate_control::CBR, rate_control::VBR],
        max_qp: 51,
        profiles: &[profile::AVC_BASELINE, profile::AVC_MAIN, profile::AVC_HIGH],
        default_profile: profile::AVC_HIGH,
        levels: level::AVC,
    },
    CodecLimits {
        codec: codec::HEVC,
        width: 64..=8192,
        height: 64..=4320,
        rate_controls: &[rate_control::CQP, rate_control::VBR],
        max_qp: 51,
        profiles: &[profile::HEVC_MAIN, profile::HEVC_MAIN10],
        default_profile: profile::HEVC_MAIN,
        levels: level::HEVC,
    },
    CodecLimits {
        codec: codec::JPEG,
        width: 64..=8192,
        height: 64..=8192,
        rate_controls: &[],
        max_qp: 0,
        profiles: &[profile::JPEG_BASELINE],
        default_profile: profile::JPEG_BASELINE,
        levels: &[],
    },
    CodecLimits {
        codec: codec::AV1,
        width: 64..=4096,
        height: 64..=2304,
        rate_controls: &[rate_control::CQP, rate_control::CBR, rate_control::VBR],
        max_qp: 63,
        profiles: &[profile::AV1_MAIN],
        default_profile: profile::AV1_MAIN,
        levels: &[],
    },
];

fn or_default(field: &mut u16, default: u16) {
    if *field == 0 {
        *field = default;
    }
}

/// Validate encoder parameters in place, filling every unset field.
///
/// Only zero fields are ever changed, so running this twice is a no-op.
pub(super) fn validate(par: &mut VideoParam) -> Status {
    match check(par) {
        Ok(()) => Status::NONE,
        Err(reason) => {
            tracing::debug!(reason, "pseudo encoder rejected parameters");
            Status::ERR_INVALID_VIDEO_PARAM
        }
    }
}

fn check(par: &mut VideoParam) -> Result<(), &'static str> {
    let limits = CODECS
        .iter()
        .find(|c| c.codec == par.codec_id)
        .ok_or("unsupported codec")?;

    or_default(&mut par.async_depth, 1);
    or_default(&mut par.io_pattern, io_pattern::IN_SYSTEM_MEMORY);
    if par.io_pattern != io_pattern::IN_SYSTEM_MEMORY {
        return Err("only system memory input is supported");
    }

    check_frame(par, limits)?;

    if limits.rate_controls.is_empty() {
        or_default(&mut par.quality, DEFAULT_JPEG_QUALITY);
        if par.quality > 100 {
            return Err("quality out of range");
        }
    } else {
        check_rate_control(par, limits)?;
    }

    or_default(&mut par.codec_profile, limits.default_profile);
    if !limits.profiles.contains(&par.codec_profile) {
        return Err("unsupported profile");
    }
    if !limits.levels.is_empty() {
        or_default(&mut par.codec_level, level::LEVEL_31);
        if !limits.levels.contains(&par.codec_level) {
            return Err("unsupported level");
        }
    }

    if par.gop_opt_flag != 0 && par.gop_opt_flag != gop::CLOSED {
        return Err("unsupported GOP flags");
    }
    or_default(&mut par.gop_pic_size, DEFAULT_GOP_PIC_SIZE);
    or_default(&mut par.gop_ref_dist, 1);
    if par.gop_ref_dist > MAX_GOP_REF_DIST {
        return Err("GOP reference distance too large");
    }
    or_default(&mut par.num_ref_frame, 1);
    or_default(&mut par.num_slice, 1);

    or_default(&mut par.target_usage, target_usage::BALANCED);
    if !(target_usage::BEST_QUALITY..=target_usage::BEST_SPEED).contains(&par.target_usage) {
        return Err("target usage out of range");
    }
    Ok(())
}

fn check_frame(par: &mut VideoParam, limits: &CodecLimits) -> Result<(), &'static str> {
    let fi = &mut par.frame_info;
    if fi.fourcc == 0 {
        fi.fourcc = fourcc::I420;
    }
    let depth = match fi.fourcc {
        fourcc::I420 => 8,
        fourcc::I010 => 10,
        _ => return Err("unsupported pixel format"),
    };

    if !limits.width.contains(&fi.width) || !limits.height.contains(&fi.height) {
        return Err("resolution out of range");
    }
    or_default(&mut fi.crop_w, fi.width);
    or_default(&mut fi.crop_h, fi.height);
    if fi.crop_x as u32 + fi.crop_w as u32 > fi.width as u32
        || fi.crop_y as u32 + fi.crop_h as u32 > fi.height as u32
    {
        return Err("crop rectangle outside the frame");
    }

    if fi.frame_rate_n == 0 {
        fi.frame_rate_n = DEFAULT_FRAME_RATE.0;
    }
    if fi.frame_rate_d == 0 {
        fi.frame_rate_d = DEFAULT_FRAME_RATE.1;
    }
    if fi.frame_rate_n > MAX_FRAME_RATE_PART || fi.frame_rate_d > MAX_FRAME_RATE_PART {
        return Err("frame rate out of range");
    }

    or_default(&mut fi.aspect_ratio_w, 1);
    or_default(&mut fi.aspect_ratio_h, 1);
    or_default(&mut fi.pic_struct, 1);
    or_default(&mut fi.chroma_format, 1);

    or_default(&mut fi.bit_depth_luma, depth);
    or_default(&mut fi.bit_depth_chroma, fi.bit_depth_luma);
    if fi.bit_depth_luma != depth || fi.bit_depth_chroma != depth {
        return Err("bit depth does not match pixel format");
    }
    Ok(())
}

fn check_rate_control(par: &mut VideoParam, limits: &CodecLimits) -> Result<(), &'static str> {
    or_default(&mut par.rate_control_method, rate_control::VBR);
    if !limits.rate_controls.contains(&par.rate_control_method) {
        return Err("unsupported rate control");
    }

    if par.rate_control_method == rate_control::CQP {
        let default_qp = limits.max_qp / 2;
        for qp in [&mut par.qpi, &mut par.qpp, &mut par.qpb] {
            or_default(qp, default_qp);
            if *qp > limits.max_qp {
                return Err("quantizer out of range");
            }
        }
        return Ok(());
    }

    or_default(&mut par.target_kbps, DEFAULT_TARGET_KBPS);
    or_default(&mut par.max_kbps, par.target_kbps);
    if par.max_kbps < par.target_kbps {
        return Err("peak bitrate below target");
    }
    if par.rate_control_method == rate_control::CBR && par.max_kbps != par.target_kbps {
        return Err("CBR needs peak bitrate equal to target");
    }
    or_default(&mut par.buffer_size_kb, par.target_kbps);
    or_default(&mut par.initial_delay_kb, par.buffer_size_kb / 2);
    if par.initial_delay_kb > par.buffer_size_kb {
        return Err("initial delay larger than buffer");
    }
    Ok(())
}

/// Fields a caller may configure, reported by `Query(NULL, out)`.
fn configurable() -> VideoParam {
    let mut par = VideoParam {
        async_depth: 1,
        io_pattern: 1,
        codec_id: 1,
        codec_profile: 1,
        codec_level: 1,
        target_usage: 1,
        gop_pic_size: 1,
        gop_ref_dist: 1,
        gop_opt_flag: 1,
        rate_control_method: 1,
        target_kbps: 1,
        max_kbps: 1,
        qpi: 1,
        qpp: 1,
        qpb: 1,
        quality: 1,
        ..Default::default()
    };
    par.frame_info.fourcc = 1;
    par.frame_info.width = 1;
    par.frame_info.height = 1;
    par.frame_info.frame_rate_n = 1;
    par.frame_info.frame_rate_d = 1;
    par
}

struct PendingFrame {
    timestamp: u64,
    data: Vec<u8>,
}

/// Encoder state of one session.
pub(super) struct Encoder {
    params: VideoParam,
    depth: usize,
    pending: VecDeque<PendingFrame>,
    stat: EncodeStat,
}

impl Encoder {
    fn new(params: VideoParam) -> Self {
        Self {
            params,
            depth: params.gop_ref_dist.max(1) as usize,
            pending: VecDeque::new(),
            stat: EncodeStat::default(),
        }
    }

    /// Frames accepted but not yet emitted.
    pub(super) fn buffered(&self) -> usize {
        self.pending.len()
    }

    fn write_packet(&mut self, frame: PendingFrame, bs: &mut Bitstream<'_>) {
        let fi = &self.params.frame_info;
        let mut packet = Vec::with_capacity(PACKET_HEADER_LEN + frame.data.len());
        packet.extend_from_slice(&PACKET_MAGIC);
        packet.extend_from_slice(&self.params.codec_id.to_le_bytes());
        packet.extend_from_slice(&fi.width.to_le_bytes());
        packet.extend_from_slice(&fi.height.to_le_bytes());
        packet.extend_from_slice(&(frame.data.len() as u32).to_le_bytes());
        packet.extend_from_slice(&frame.data);

        // The caller checked `remaining()` covers the packet.
        let spare = bs.spare_capacity_mut();
        let written = packet.len().min(spare.len());
        spare[..written].copy_from_slice(&packet[..written]);
        bs.commit(written);
        bs.timestamp = frame.timestamp;

        self.stat.num_frame += 1;
        self.stat.num_bit += packet.len() as u64 * 8;
    }
}

fn packet_len(frame: &PendingFrame) -> usize {
    PACKET_HEADER_LEN + frame.data.len()
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
                return write_out(out, configurable());
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

pub(super) unsafe extern "C" fn query_io_surf(
    session: NativeSession,
    par: *const VideoParam,
    request: *mut FrameAllocRequest,
) -> Status {
    // SAFETY: handles and pointers per the backend contract.
    unsafe {
        with_session(session, |_| {
            let Some(mut par) = par.as_ref().copied() else {
                return Status::ERR_NULL_PTR;
            };
            let status = validate(&mut par);
            if status.is_error() {
                return status;
            }
            let suggested = SUGGESTED_SURFACES.max(par.gop_ref_dist);
            write_out(
                request,
                FrameAllocRequest {
                    info: par.frame_info,
                    memory_type: io_pattern::IN_SYSTEM_MEMORY,
                    num_frame_min: suggested,
                    num_frame_suggested: suggested,
                },
            )
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
            if s.encoder.is_some() {
                return Status::ERR_UNDEFINED_BEHAVIOR;
            }
            let status = validate(&mut par);
            if status.is_error() {
                return status;
            }
            s.encoder = Some(Encoder::new(par));
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
            let Some(encoder) = s.encoder.as_mut() else {
                return Status::ERR_NOT_INITIALIZED;
            };
            let status = validate(&mut par);
            if status.is_error() {
                return status;
            }
            if par.codec_id != encoder.params.codec_id {
                return Status::ERR_INCOMPATIBLE_VIDEO_PARAM;
            }
            *encoder = Encoder::new(par);
            Status::NONE
        })
    }
}

pub(super) unsafe extern "C" fn close(session: NativeSession) -> Status {
    // SAFETY: handles come from this backend.
    unsafe {
        with_session(session, |s| match &s.encoder {
            None => Status::ERR_NOT_INITIALIZED,
            Some(encoder) if encoder.buffered() > 0 => Status::ERR_UNDEFINED_BEHAVIOR,
            Some(_) => {
                s.encoder = None;
                Status::NONE
            }
        })
    }
}

pub(super) unsafe extern "C" fn get_video_param(
    session: NativeSession,
    out: *mut VideoParam,
) -> Status {
    // SAFETY: handles and pointers per the backend contract.
    unsafe {
        with_session(session, |s| match &s.encoder {
            Some(encoder) => write_out(out, encoder.params),
            None => Status::ERR_NOT_INITIALIZED,
        })
    }
}

pub(super) unsafe extern "C" fn get_encode_stat(
    session: NativeSession,
    out: *mut EncodeStat,
) -> Status {
    // SAFETY: handles and pointers per the backend contract.
    unsafe {
        with_session(session, |s| match &s.encoder {
            Some(encoder) => write_out(
                out,
                EncodeStat {
                    num_cached_frame: encoder.buffered() as u32,
                    ..encoder.stat
                },
            ),
            None => Status::ERR_NOT_INITIALIZED,
        })
    }
}

pub(super) unsafe extern "C" fn frame_async(
    session: NativeSession,
    _ctrl: *const EncodeCtrl,
    surface: *mut FrameSurface<'_>,
    bs: *mut Bitstream<'_>,
    sync: *mut SyncPoint,
) -> Status {
    // SAFETY: handles come from this backend.
    let Some(s) = (unsafe { session_mut(session) }) else {
        return Status::ERR_INVALID_HANDLE;
    };
    // SAFETY: bitstream is null or valid for the call.
    let Some(bs) = (unsafe { bs.as_mut() }) else {
        return Status::ERR_NULL_PTR;
    };
    if sync.is_null() || bs.is_null() {
        return Status::ERR_NULL_PTR;
    }
    let Some(encoder) = s.encoder.as_mut() else {
        return Status::ERR_NOT_INITIALIZED;
    };

    // SAFETY: surface is null (drain) or valid for the call.
    let incoming = match unsafe { surface.as_ref() } {
        None => None,
        Some(surface) => {
            let size = encoder.params.frame_info.frame_size();
            if surface.is_null() {
                return Status::ERR_NULL_PTR;
            }
            if surface.info.width != encoder.params.frame_info.width
                || surface.info.height != encoder.params.frame_info.height
                || surface.data_len() < size
            {
                return Status::ERR_INCOMPATIBLE_VIDEO_PARAM;
            }
            Some(PendingFrame {
                timestamp: surface.timestamp,
                data: surface.as_bytes()[..size].to_vec(),
            })
        }
    };

    match incoming {
        Some(frame) => {
            if encoder.pending.len() + 1 < encoder.depth {
                encoder.pending.push_back(frame);
                return Status::ERR_MORE_DATA;
            }
            let next = encoder.pending.front().unwrap_or(&frame);
            if bs.remaining() < packet_len(next) {
                return Status::ERR_NOT_ENOUGH_BUFFER;
            }
            encoder.pending.push_back(frame);
        }
        None => match encoder.pending.front() {
            None => return Status::ERR_MORE_DATA,
            Some(next) if bs.remaining() < packet_len(next) => {
                return Status::ERR_NOT_ENOUGH_BUFFER;
            }
            Some(_) => {}
        },
    }

    let Some(frame) = encoder.pending.pop_front() else {
        return Status::ERR_MORE_DATA;
    };
    encoder.write_packet(frame, bs);
    let depth = encoder.params.async_depth;
    let token = s.submit_task(depth);
    // SAFETY: checked non-null above.
    unsafe { sync.write(token) };
    Status::NONE
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::FrameInfo;

    fn avc(width: u16, height: u16) -> VideoParam {
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

    #[test]
    fn test_defaults_filled() {
        let mut par = avc(640, 480);
        assert_eq!(validate(&mut par), Status::NONE);

        assert_eq!(par.frame_info.fourcc, fourcc::I420);
        assert_eq!(par.frame_info.frame_rate_n, 30);
        assert_eq!(par.frame_info.frame_rate_d, 1);
        assert_eq!(par.frame_info.aspect_ratio_w, 1);
        assert_eq!(par.frame_info.bit_depth_luma, 8);
        assert_eq!(par.rate_control_method, rate_control::VBR);
        assert_eq!(par.target_kbps, 4000);
        assert_eq!(par.buffer_size_kb, 4000);
        assert_eq!(par.codec_profile, profile::AVC_HIGH);
        assert_eq!(par.codec_level, level::LEVEL_31);
        assert_eq!(par.target_usage, target_usage::BALANCED);
    }

    #[test]
    fn test_validation_is_idempotent() {
        let mut once = avc(1280, 720);
        once.rate_control_method = rate_control::CQP;
        assert_eq!(validate(&mut once), Status::NONE);
        let mut twice = once;
        assert_eq!(validate(&mut twice), Status::NONE);
        assert_eq!(once, twice);
        assert_eq!(once.qpi, 25);
    }

    #[test]
    fn test_codec_limits() {
        assert_eq!(validate(&mut avc(32, 480)), Status::ERR_INVALID_VIDEO_PARAM);
        assert_eq!(validate(&mut avc(8192, 2160)), Status::ERR_INVALID_VIDEO_PARAM);

        let mut hevc = avc(8192, 4320);
        hevc.codec_id = codec::HEVC;
        assert_eq!(validate(&mut hevc), Status::NONE);

        let mut hevc_cbr = avc(640, 480);
        hevc_cbr.codec_id = codec::HEVC;
        hevc_cbr.rate_control_method = rate_control::CBR;
        assert_eq!(validate(&mut hevc_cbr), Status::ERR_INVALID_VIDEO_PARAM);

        let mut av1 = avc(640, 480);
        av1.codec_id = codec::AV1;
        av1.rate_control_method = rate_control::CQP;
        av1.qpi = 63;
        assert_eq!(validate(&mut av1), Status::NONE);
        av1.qpi = 64;
        assert_eq!(validate(&mut av1), Status::ERR_INVALID_VIDEO_PARAM);
    }

    #[test]
    fn test_jpeg_quality() {
        let mut jpeg = avc(640, 480);
        jpeg.codec_id = codec::JPEG;
        assert_eq!(validate(&mut jpeg), Status::NONE);
        assert_eq!(jpeg.quality, 80);
        assert_eq!(jpeg.rate_control_method, 0);

        jpeg.quality = 101;
        assert_eq!(validate(&mut jpeg), Status::ERR_INVALID_VIDEO_PARAM);
    }

    #[test]
    fn test_rejects_bad_fields() {
        let mut par = avc(640, 480);
        par.frame_info.fourcc = fourcc::NV12;
        assert_eq!(validate(&mut par), Status::ERR_INVALID_VIDEO_PARAM);

        let mut par = avc(640, 480);
        par.gop_opt_flag = gop::STRICT;
        assert_eq!(validate(&mut par), Status::ERR_INVALID_VIDEO_PARAM);

        let mut par = avc(640, 480);
        par.target_usage = 8;
        assert_eq!(validate(&mut par), Status::ERR_INVALID_VIDEO_PARAM);

        let mut par = avc(640, 480);
        par.frame_info.frame_rate_n = 70000;
        assert_eq!(validate(&mut par), Status::ERR_INVALID_VIDEO_PARAM);

        let mut par = avc(640, 480);
        par.frame_info.fourcc = fourcc::I010;
        par.frame_info.bit_depth_luma = 8;
        assert_eq!(validate(&mut par), Status::ERR_INVALID_VIDEO_PARAM);

        let mut par = avc(640, 480);
        par.codec_id = 0;
        assert_eq!(validate(&mut par), Status::ERR_INVALID_VIDEO_PARAM);
    }
}
