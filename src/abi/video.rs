//! Video payloads: parameters, surfaces, bitstreams and statistics.

use std::ffi::c_void;
use std::marker::PhantomData;
use std::ptr;

/// Build a little-endian FourCC code.
pub const fn make_fourcc(code: &[u8; 4]) -> u32 {
    u32::from_le_bytes(*code)
}

/// Pixel formats.
pub mod fourcc {
    use super::make_fourcc;

    /// Planar 4:2:0, 8 bit.
    pub const I420: u32 = make_fourcc(b"I420");
    /// Planar 4:2:0, 10 bit.
    pub const I010: u32 = make_fourcc(b"I010");
    /// Semi-planar 4:2:0, 8 bit.
    pub const NV12: u32 = make_fourcc(b"NV12");
}

/// Codec identifiers.
pub mod codec {
    use super::make_fourcc;

    /// H.264 / AVC.
    pub const AVC: u32 = make_fourcc(b"AVC ");
    /// H.265 / HEVC.
    pub const HEVC: u32 = make_fourcc(b"HEVC");
    /// Motion JPEG.
    pub const JPEG: u32 = make_fourcc(b"JPEG");
    /// AV1.
    pub const AV1: u32 = make_fourcc(b"AV1 ");
}

/// Codec profiles.
pub mod profile {
    /// AVC baseline.
    pub const AVC_BASELINE: u16 = 66;
    /// AVC main.
    pub const AVC_MAIN: u16 = 77;
    /// AVC high.
    pub const AVC_HIGH: u16 = 100;
    /// HEVC main.
    pub const HEVC_MAIN: u16 = 1;
    /// HEVC main 10.
    pub const HEVC_MAIN10: u16 = 2;
    /// JPEG baseline.
    pub const JPEG_BASELINE: u16 = 1;
    /// AV1 main.
    pub const AV1_MAIN: u16 = 1;
}

/// Codec levels, as level * 10.
pub mod level {
    /// AVC levels in ascending order.
    pub const AVC: &[u16] = &[
        9, 10, 11, 12, 13, 20, 21, 22, 30, 31, 32, 40, 41, 42, 50, 51, 52,
    ];
    /// HEVC levels in ascending order.
    pub const HEVC: &[u16] = &[10, 20, 21, 30, 31, 40, 41, 50, 51, 52, 60, 61, 62];
    /// Level 3.1.
    pub const LEVEL_31: u16 = 31;
}

/// Bitrate control methods.
pub mod rate_control {
    /// Constant bitrate.
    pub const CBR: u16 = 1;
    /// Variable bitrate.
    pub const VBR: u16 = 2;
    /// Constant quantizer.
    pub const CQP: u16 = 3;
}

/// Speed/quality trade-off, 1 (best quality) to 7 (best speed).
pub mod target_usage {
    /// Best quality.
    pub const BEST_QUALITY: u16 = 1;
    /// Balanced.
    pub const BALANCED: u16 = 4;
    /// Best speed.
    pub const BEST_SPEED: u16 = 7;
}

/// GOP structure flags.
pub mod gop {
    /// GOPs do not reference across boundaries.
    pub const CLOSED: u16 = 1;
    /// GOP structure must be followed exactly.
    pub const STRICT: u16 = 2;
}

/// Memory pattern of component input and output.
pub mod io_pattern {
    /// Input surfaces live in system memory.
    pub const IN_SYSTEM_MEMORY: u16 = 0x02;
    /// Output surfaces live in system memory.
    pub const OUT_SYSTEM_MEMORY: u16 = 0x20;
}

/// Geometry and format of a video frame.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameInfo {
    /// Pixel format.
    pub fourcc: u32,
    /// Allocated width in pixels.
    pub width: u16,
    /// Allocated height in pixels.
    pub height: u16,
    /// Crop rectangle left edge.
    pub crop_x: u16,
    /// Crop rectangle top edge.
    pub crop_y: u16,
    /// Crop rectangle width.
    pub crop_w: u16,
    /// Crop rectangle height.
    pub crop_h: u16,
    /// Frame rate numerator.
    pub frame_rate_n: u32,
    /// Frame rate denominator.
    pub frame_rate_d: u32,
    /// Pixel aspect ratio width.
    pub aspect_ratio_w: u16,
    /// Pixel aspect ratio height.
    pub aspect_ratio_h: u16,
    /// Picture structure.
    pub pic_struct: u16,
    /// Chroma subsampling.
    pub chroma_format: u16,
    /// Luma bit depth.
    pub bit_depth_luma: u16,
    /// Chroma bit depth.
    pub bit_depth_chroma: u16,
}

impl FrameInfo {
    /// Bytes needed to hold one planar 4:2:0 frame of this geometry.
    pub fn frame_size(&self) -> usize {
        let bytes_per_sample = if self.bit_depth_luma > 8 { 2 } else { 1 };
        let luma = self.width as usize * self.height as usize;
        (luma + luma / 2) * bytes_per_sample
    }
}

/// Parameters of an encoder, decoder or VPP component.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VideoParam {
    /// Maximum number of in-flight asynchronous operations.
    pub async_depth: u16,
    /// Memory pattern, see [`io_pattern`].
    pub io_pattern: u16,
    /// Codec, see [`codec`].
    pub codec_id: u32,
    /// Codec profile, see [`profile`].
    pub codec_profile: u16,
    /// Codec level, see [`level`].
    pub codec_level: u16,
    /// Speed/quality trade-off, see [`target_usage`].
    pub target_usage: u16,
    /// Frames per GOP.
    pub gop_pic_size: u16,
    /// Distance between anchor frames.
    pub gop_ref_dist: u16,
    /// GOP flags, see [`gop`].
    pub gop_opt_flag: u16,
    /// IDR frame interval.
    pub idr_interval: u16,
    /// Rate control method, see [`rate_control`].
    pub rate_control_method: u16,
    /// Initial decoder buffer fullness.
    pub initial_delay_kb: u16,
    /// Decoder buffer size.
    pub buffer_size_kb: u16,
    /// Target bitrate.
    pub target_kbps: u16,
    /// Peak bitrate.
    pub max_kbps: u16,
    /// Quantizer for I frames (CQP).
    pub qpi: u16,
    /// Quantizer for P frames (CQP).
    pub qpp: u16,
    /// Quantizer for B frames (CQP).
    pub qpb: u16,
    /// JPEG quality, 1 to 100.
    pub quality: u16,
    /// Slices per frame.
    pub num_slice: u16,
    /// Reference frames.
    pub num_ref_frame: u16,
    /// Frame format for encode and decode.
    pub frame_info: FrameInfo,
    /// VPP input format.
    pub vpp_in: FrameInfo,
    /// VPP output format.
    pub vpp_out: FrameInfo,
}

/// Surface requirements reported by `QueryIoSurf`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameAllocRequest {
    /// Format of the requested surfaces.
    pub info: FrameInfo,
    /// Memory type flags.
    pub memory_type: u16,
    /// Minimum number of surfaces.
    pub num_frame_min: u16,
    /// Suggested number of surfaces.
    pub num_frame_suggested: u16,
}

/// Surfaces handed out by an external frame allocator.
#[repr(C)]
#[derive(Debug)]
pub struct FrameAllocResponse {
    /// Memory ids, one per surface.
    pub mids: *mut *mut c_void,
    /// Number of entries in `mids`.
    pub num_frame_actual: u16,
}

/// External frame allocator installed with `SetFrameAllocator`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FrameAllocator {
    /// Opaque allocator state passed to every callback.
    pub context: *mut c_void,
    /// Allocate surfaces.
    pub alloc: Option<
        unsafe extern "C" fn(
            *mut c_void,
            *const FrameAllocRequest,
            *mut FrameAllocResponse,
        ) -> crate::status::Status,
    >,
    /// Release surfaces allocated by `alloc`.
    pub free: Option<
        unsafe extern "C" fn(*mut c_void, *mut FrameAllocResponse) -> crate::status::Status,
    >,
}

/// A compressed data buffer.
///
/// Borrows the caller's storage for `'a`; backends read `data_offset() ..
/// data_offset() + data_length()` and may append up to `max_length()`.
///
/// The storage pointer and the lengths are private: `max_length` is always
/// the length of the borrowed slice, and every setter clamps to it.
#[repr(C)]
#[derive(Debug)]
pub struct Bitstream<'a> {
    data: *mut u8,
    data_offset: u32,
    data_length: u32,
    max_length: u32,
    /// Presentation timestamp.
    pub timestamp: u64,
    /// Frame type of the contained data.
    pub frame_type: u16,
    _storage: PhantomData<&'a mut [u8]>,
}

impl<'a> Bitstream<'a> {
    /// An empty bitstream writing into `storage`.
    ///
    /// Storage beyond `u32::MAX` bytes is not addressable and is ignored.
    pub fn from_slice(storage: &'a mut [u8]) -> Self {
        Self {
            data: storage.as_mut_ptr(),
            data_offset: 0,
            data_length: 0,
            max_length: u32::try_from(storage.len()).unwrap_or(u32::MAX),
            timestamp: 0,
            frame_type: 0,
            _storage: PhantomData,
        }
    }

    /// A bitstream whose first `len` bytes of `storage` are valid input.
    pub fn with_data(storage: &'a mut [u8], len: usize) -> Self {
        let mut bs = Self::from_slice(storage);
        bs.set_data_length(len);
        bs
    }

    /// A bitstream with no storage at all.
    pub fn null() -> Self {
        Self {
            data: ptr::null_mut(),
            data_offset: 0,
            data_length: 0,
            max_length: 0,
            timestamp: 0,
            frame_type: 0,
            _storage: PhantomData,
        }
    }

    /// True when the bitstream has no storage.
    pub fn is_null(&self) -> bool {
        self.data.is_null()
    }

    /// Offset of the first valid byte.
    pub fn data_offset(&self) -> u32 {
        self.data_offset
    }

    /// Number of valid bytes.
    pub fn data_length(&self) -> u32 {
        self.data_length
    }

    /// Capacity of the storage.
    pub fn max_length(&self) -> u32 {
        self.max_length
    }

    /// Mark `len` bytes from the current offset as valid, clamped to the
    /// storage.
    pub fn set_data_length(&mut self, len: usize) {
        let room = self.max_length.saturating_sub(self.data_offset);
        self.data_length = u32::try_from(len).unwrap_or(u32::MAX).min(room);
    }

    /// The valid bytes.
    pub fn filled(&self) -> &[u8] {
        let (start, end) = self.valid_range();
        if self.data.is_null() {
            return &[];
        }
        // SAFETY: `data` covers `max_length` bytes borrowed for `'a`, and the
        // range is clamped to that capacity.
        unsafe { std::slice::from_raw_parts(self.data.add(start), end - start) }
    }

    /// The free bytes after the valid region.
    pub fn spare_capacity_mut(&mut self) -> &mut [u8] {
        let (_, end) = self.valid_range();
        if self.data.is_null() {
            return &mut [];
        }
        // SAFETY: `end <= max_length`, and `data` covers `max_length` bytes
        // borrowed mutably for `'a`.
        unsafe {
            std::slice::from_raw_parts_mut(self.data.add(end), self.max_length as usize - end)
        }
    }

    /// Extend the valid region by `n` bytes written into
    /// [`spare_capacity_mut`](Self::spare_capacity_mut); clamped to the
    /// storage. Returns the number of bytes committed.
    pub fn commit(&mut self, n: usize) -> usize {
        let n = n.min(self.remaining());
        let (start, end) = self.valid_range();
        // `n` fits in u32 since it is bounded by `max_length`.
        self.data_offset = start as u32;
        self.data_length = (end - start + n) as u32;
        n
    }

    /// Drop `n` bytes from the front of the valid region. Returns the
    /// number of bytes consumed.
    pub fn consume(&mut self, n: usize) -> usize {
        let (start, end) = self.valid_range();
        let n = n.min(end - start);
        self.data_offset = (start + n) as u32;
        self.data_length = (end - start - n) as u32;
        n
    }

    /// Bytes still free after the valid region.
    pub fn remaining(&self) -> usize {
        let (_, end) = self.valid_range();
        self.max_length as usize - end
    }

    /// Mark the valid region as consumed.
    pub fn clear(&mut self) {
        self.data_offset = 0;
        self.data_length = 0;
    }

    // Backends may rewrite the offsets across the native boundary, so the
    // range is clamped on every read.
    fn valid_range(&self) -> (usize, usize) {
        let start = self.data_offset.min(self.max_length);
        let end = self
            .data_offset
            .saturating_add(self.data_length)
            .min(self.max_length);
        (start as usize, end as usize)
    }
}

/// An uncompressed frame in system memory.
///
/// The pixel pointer and its length are private and always describe the
/// borrowed storage.
#[repr(C)]
#[derive(Debug)]
pub struct FrameSurface<'a> {
    /// Frame format.
    pub info: FrameInfo,
    data: *mut u8,
    data_len: u32,
    /// Bytes per luma row.
    pub pitch: u32,
    /// Presentation timestamp.
    pub timestamp: u64,
    /// Display order assigned by the backend.
    pub frame_order: u32,
    /// Non-zero while the backend still references the surface.
    pub locked: u16,
    _storage: PhantomData<&'a mut [u8]>,
}

impl<'a> FrameSurface<'a> {
    /// A surface over `storage` with the given format.
    pub fn from_slice(info: FrameInfo, storage: &'a mut [u8]) -> Self {
        Self {
            info,
            data: storage.as_mut_ptr(),
            data_len: u32::try_from(storage.len()).unwrap_or(u32::MAX),
            pitch: info.width as u32,
            timestamp: 0,
            frame_order: 0,
            locked: 0,
            _storage: PhantomData,
        }
    }

    /// A surface with no pixel storage.
    pub fn null(info: FrameInfo) -> Self {
        Self {
            info,
            data: ptr::null_mut(),
            data_len: 0,
            pitch: 0,
            timestamp: 0,
            frame_order: 0,
            locked: 0,
            _storage: PhantomData,
        }
    }

    /// True when the surface has no pixel storage.
    pub fn is_null(&self) -> bool {
        self.data.is_null()
    }

    /// Size of the pixel data in bytes.
    pub fn data_len(&self) -> usize {
        self.data_len as usize
    }

    /// The pixel data.
    pub fn as_bytes(&self) -> &[u8] {
        if self.data.is_null() {
            return &[];
        }
        // SAFETY: `data` covers `data_len` bytes borrowed for `'a`.
        unsafe { std::slice::from_raw_parts(self.data, self.data_len as usize) }
    }

    /// The pixel data, writable.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        if self.data.is_null() {
            return &mut [];
        }
        // SAFETY: `data` covers `data_len` bytes borrowed mutably for `'a`.
        unsafe { std::slice::from_raw_parts_mut(self.data, self.data_len as usize) }
    }

    /// Start of the pixel data, for in-place processing across surfaces.
    pub fn as_ptr(&self) -> *const u8 {
        self.data
    }

    /// Writable start of the pixel data.
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.data
    }
}

/// Per-frame encoder controls.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EncodeCtrl {
    /// Forced frame type, zero for automatic.
    pub frame_type: u16,
    /// Non-zero to skip this frame.
    pub skip_frame: u16,
    /// Forced quantizer, zero for automatic.
    pub qp: u16,
}

/// Encoder statistics.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EncodeStat {
    /// Frames encoded.
    pub num_frame: u32,
    /// Frames buffered inside the encoder.
    pub num_cached_frame: u32,
    /// Bits produced.
    pub num_bit: u64,
}

/// Decoder statistics.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DecodeStat {
    /// Frames decoded.
    pub num_frame: u32,
    /// Frames skipped.
    pub num_skipped_frame: u32,
    /// Corrupt frames.
    pub num_error: u32,
    /// Frames buffered inside the decoder.
    pub num_cached_frame: u32,
}

/// VPP statistics.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VppStat {
    /// Frames processed.
    pub num_frame: u32,
    /// Frames buffered inside VPP.
    pub num_cached_frame: u32,
}

/// Decoder frame skipping adjustment.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkipMode(pub i32);

impl SkipMode {
    /// Decode every frame.
    pub const NO_SKIP: SkipMode = SkipMode(0);
    /// Skip more frames.
    pub const MORE: SkipMode = SkipMode(1);
    /// Skip fewer frames.
    pub const LESS: SkipMode = SkipMode(2);
}

/// User payload extracted by the decoder.
#[repr(C)]
#[derive(Debug)]
pub struct Payload<'a> {
    data: *mut u8,
    /// Payload size in bits.
    pub num_bit: u32,
    /// Payload type.
    pub payload_type: u16,
    buf_size: u16,
    _storage: PhantomData<&'a mut [u8]>,
}

impl<'a> Payload<'a> {
    /// A payload buffer over `storage`, truncated to `u16::MAX` bytes.
    pub fn from_slice(storage: &'a mut [u8]) -> Self {
        Self {
            data: storage.as_mut_ptr(),
            num_bit: 0,
            payload_type: 0,
            buf_size: u16::try_from(storage.len()).unwrap_or(u16::MAX),
            _storage: PhantomData,
        }
    }

    /// A payload with no buffer.
    pub fn null() -> Self {
        Self {
            data: ptr::null_mut(),
            num_bit: 0,
            payload_type: 0,
            buf_size: 0,
            _storage: PhantomData,
        }
    }

    /// True when the payload has no buffer.
    pub fn is_null(&self) -> bool {
        self.data.is_null()
    }

    /// Capacity of the buffer in bytes.
    pub fn buf_size(&self) -> usize {
        self.buf_size as usize
    }

    /// The payload bytes written by the decoder, clamped to the buffer.
    pub fn as_bytes(&self) -> &[u8] {
        if self.data.is_null() {
            return &[];
        }
        let len = (self.num_bit as usize).div_ceil(8).min(self.buf_size as usize);
        // SAFETY: `data` covers `buf_size` bytes borrowed for `'a`.
        unsafe { std::slice::from_raw_parts(self.data, len) }
    }
}

/// Hardware platform description.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Platform {
    /// Product family.
    pub code_name: u16,
    /// PCI device id.
    pub device_id: u16,
    /// Integrated or discrete.
    pub media_adapter_type: u16,
}

/// A backend-owned surface lent to the caller.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceHandle(pub *mut c_void);
