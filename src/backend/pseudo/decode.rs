//! Pseudo decoder: reads back the packets the pseudo encoder writes.

use super::encode::{PACKET_HEADER_LEN, PACKET_MAGIC};
use super::{session_mut, with_session, write_out};
use crate::abi::{
    Bitstream, DecodeStat, FrameAllocRequest, FrameInfo, FrameSurface, NativeSession, Payload,
    SkipMode, SyncPoint, VideoParam, codec, fourcc, io_pattern,
};
use crate::status::Status;

const MAX_WIDTH: u16 = 3840;
const MAX_HEIGHT: u16 = 2160;
const SUGGESTED_SURFACES: u16 = 3;

/// Parsed packet header.
struct PacketHeader {
    codec_id: u32,
    width: u16,
    height: u16,
    payload_len: usize,
}

impl PacketHeader {
    fn parse(data: &[u8]) -> Result<Self, Status> {
        if data.len() < PACKET_HEADER_LEN {
            return Err(Status::ERR_MORE_DATA);
        }
        if data[..4] != PACKET_MAGIC {
            return Err(Status::ERR_UNSUPPORTED);
        }
        let u16_at = |i: usize| u16::from_le_bytes([data[i], data[i + 1]]);
        let u32_at = |i: usize| u32::from_le_bytes([data[i], data[i + 1], data[i + 2], data[i + 3]]);
        Ok(Self {
            codec_id: u32_at(4),
            width: u16_at(8),
            height: u16_at(10),
            payload_len: u32_at(12) as usize,
        })
    }

    fn frame_info(&self) -> FrameInfo {
        let luma = self.width as usize * self.height as usize;
        let wide = self.payload_len >= luma * 3;
        let depth = if wide { 10 } else { 8 };
        FrameInfo {
            fourcc: if wide { fourcc::I010 } else { fourcc::I420 },
            width: self.width,
            height: self.height,
            crop_w: self.width,
            crop_h: self.height,
            frame_rate_n: 30,
            frame_rate_d: 1,
            aspect_ratio_w: 1,
            aspect_ratio_h: 1,
            pic_struct: 1,
            chroma_format: 1,
            bit_depth_luma: depth,
            bit_depth_chroma: depth,
            ..Default::default()
        }
    }
}

fn validate(par: &mut VideoParam) -> Status {
    if ![codec::AVC, codec::HEVC, codec::JPEG, codec::AV1].contains(&par.codec_id) {
        return Status::ERR_INVALID_VIDEO_PARAM;
    }
    if par.io_pattern == 0 {
        par.io_pattern = io_pattern::OUT_SYSTEM_MEMORY;
    }
    if par.async_depth == 0 {
        par.async_depth = 1;
    }
    let fi = &mut par.frame_info;
    if fi.fourcc == 0 {
        fi.fourcc = fourcc::I420;
    }
    if fi.fourcc != fourcc::I420 && fi.fourcc != fourcc::I010 {
        return Status::ERR_INVALID_VIDEO_PARAM;
    }
    if fi.width == 0 || fi.height == 0 || fi.width > MAX_WIDTH || fi.height > MAX_HEIGHT {
        return Status::ERR_INVALID_VIDEO_PARAM;
    }
    Status::NONE
}

/// Decoder state of one session.
pub(super) struct Decoder {
    params: VideoParam,
    stat: DecodeStat,
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
                    codec_id: 1,
                    io_pattern: 1,
                    async_depth: 1,
                    ..Default::default()
                };
                par.frame_info.fourcc = 1;
                par.frame_info.width = 1;
                par.frame_info.height = 1;
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

pub(super) unsafe extern "C" fn header(
    session: NativeSession,
    bs: *mut Bitstream<'_>,
    out: *mut VideoParam,
) -> Status {
    // SAFETY: handles and pointers per the backend contract.
    unsafe {
        with_session(session, |_| {
            let Some(bs) = bs.as_ref() else {
                return Status::ERR_NULL_PTR;
            };
            if out.is_null() {
                return Status::ERR_NULL_PTR;
            }
            match PacketHeader::parse(bs.filled()) {
                Ok(header) => write_out(
                    out,
                    VideoParam {
                        codec_id: header.codec_id,
                        io_pattern: io_pattern::OUT_SYSTEM_MEMORY,
                        async_depth: 1,
                        frame_info: header.frame_info(),
                        ..Default::default()
                    },
                ),
                Err(status) => status,
            }
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
            write_out(
                request,
                FrameAllocRequest {
                    info: par.frame_info,
                    memory_type: io_pattern::OUT_SYSTEM_MEMORY,
                    num_frame_min: SUGGESTED_SURFACES,
                    num_frame_suggested: SUGGESTED_SURFACES,
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
            if s.decoder.is_some() {
                return Status::ERR_UNDEFINED_BEHAVIOR;
            }
            let status = validate(&mut par);
            if status.is_error() {
                return status;
            }
            s.decoder = Some(Decoder {
                params: par,
                stat: DecodeStat::default(),
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
            let Some(decoder) = s.decoder.as_mut() else {
                return Status::ERR_NOT_INITIALIZED;
            };
            let status = validate(&mut par);
            if status.is_error() {
                return status;
            }
            decoder.params = par;
            decoder.stat = DecodeStat::default();
            Status::NONE
        })
    }
}

pub(super) unsafe extern "C" fn close(session: NativeSession) -> Status {
    // SAFETY: handles come from this backend.
    unsafe {
        with_session(session, |s| match s.decoder.take() {
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
        with_session(session, |s| match &s.decoder {
            Some(decoder) => write_out(out, decoder.params),
            None => Status::ERR_NOT_INITIALIZED,
        })
    }
}

pub(super) unsafe extern "C" fn get_decode_stat(
    session: NativeSession,
    out: *mut DecodeStat,
) -> Status {
    // SAFETY: handles and pointers per the backend contract.
    unsafe {
        with_session(session, |s| match &s.decoder {
            Some(decoder) => write_out(out, decoder.stat),
            None => Status::ERR_NOT_INITIALIZED,
        })
    }
}

pub(super) unsafe extern "C" fn set_skip_mode(session: NativeSession, mode: SkipMode) -> Status {
    // SAFETY: handles come from this backend.
    unsafe {
        with_session(session, |s| {
            if s.decoder.is_none() {
                return Status::ERR_NOT_INITIALIZED;
            }
            // Every pseudo frame is independent, so skipping changes nothing.
            if (SkipMode::NO_SKIP.0..=SkipMode::LESS.0).contains(&mode.0) {
                Status::NONE
            } else {
                Status::ERR_INVALID_VIDEO_PARAM
            }
        })
    }
}

pub(super) unsafe extern "C" fn get_payload(
    session: NativeSession,
    timestamp: *mut u64,
    payload: *mut Payload<'_>,
) -> Status {
    // SAFETY: handles and pointers per the backend contract.
    unsafe {
        with_session(session, |s| {
            if s.decoder.is_none() {
                return Status::ERR_NOT_INITIALIZED;
            }
            let Some(payload) = payload.as_mut() else {
                return Status::ERR_NULL_PTR;
            };
            // Pseudo packets carry no user payloads.
            payload.num_bit = 0;
            payload.payload_type = 0;
            write_out(timestamp, 0)
        })
    }
}

pub(super) unsafe extern "C" fn frame_async(
    session: NativeSession,
    bs: *mut Bitstream<'_>,
    work: *mut FrameSurface<'_>,
    sync: *mut SyncPoint,
) -> Status {
    // SAFETY: handles come from this backend.
    let Some(s) = (unsafe { session_mut(session) }) else {
        return Status::ERR_INVALID_HANDLE;
    };
    // SAFETY: work surface is null or valid for the call.
    let Some(work) = (unsafe { work.as_mut() }) else {
        return Status::ERR_NULL_PTR;
    };
    if sync.is_null() || work.is_null() {
        return Status::ERR_NULL_PTR;
    }
    let Some(decoder) = s.decoder.as_mut() else {
        return Status::ERR_NOT_INITIALIZED;
    };
    // SAFETY: a null bitstream asks to drain; the decoder buffers nothing.
    let Some(bs) = (unsafe { bs.as_mut() }) else {
        return Status::ERR_MORE_DATA;
    };

    let header = match PacketHeader::parse(bs.filled()) {
        Ok(header) => header,
        Err(status) => return status,
    };
    let packet_len = PACKET_HEADER_LEN + header.payload_len;
    if bs.filled().len() < packet_len {
        return Status::ERR_MORE_DATA;
    }
    if work.data_len() < header.payload_len {
        return Status::ERR_MORE_SURFACE;
    }

    let payload = &bs.filled()[PACKET_HEADER_LEN..packet_len];
    work.as_bytes_mut()[..payload.len()].copy_from_slice(payload);
    work.info = header.frame_info();
    work.timestamp = bs.timestamp;
    work.frame_order = decoder.stat.num_frame;

    bs.consume(packet_len);
    decoder.stat.num_frame += 1;
    let depth = decoder.params.async_depth;

    let token = s.submit_task(depth);
    // SAFETY: checked non-null above.
    unsafe { sync.write(token) };
    Status::NONE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_parse() {
        let mut packet = Vec::new();
        packet.extend_from_slice(b"MXPF");
        packet.extend_from_slice(&codec::HEVC.to_le_bytes());
        packet.extend_from_slice(&64u16.to_le_bytes());
        packet.extend_from_slice(&32u16.to_le_bytes());
        packet.extend_from_slice(&(64u32 * 32 * 3).to_le_bytes());

        let header = PacketHeader::parse(&packet).unwrap();
        assert_eq!(header.codec_id, codec::HEVC);
        assert_eq!((header.width, header.height), (64, 32));
        assert_eq!(header.frame_info().fourcc, fourcc::I010);

        assert_eq!(
            PacketHeader::parse(&packet[..8]).err(),
            Some(Status::ERR_MORE_DATA)
        );
        packet[0] = b'X';
        assert_eq!(
            PacketHeader::parse(&packet).err(),
            Some(Status::ERR_UNSUPPORTED)
        );
    }

    #[test]
    fn test_resolution_limit() {
        let mut par = VideoParam {
            codec_id: codec::AVC,
            ..Default::default()
        };
        par.frame_info.width = 3840;
        par.frame_info.height = 2160;
        assert_eq!(validate(&mut par), Status::NONE);
        par.frame_info.width = 4096;
        assert_eq!(validate(&mut par), Status::ERR_INVALID_VIDEO_PARAM);
    }
}
