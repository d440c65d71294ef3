//! Video trampolines: state check, payload check, table lookup, forward.

use super::Session;
use crate::abi::{
    Bitstream, CloseFn, ComponentInitFn, DecodeFrameAsyncFn, DecodeGetStatFn, DecodeHeaderFn,
    DecodeStat, EncodeCtrl, EncodeFrameAsyncFn, EncodeGetStatFn, EncodeStat, FrameAllocRequest,
    FrameAllocator, FrameSurface, GetHandleFn, GetPayloadFn, GetPriorityFn, GetSurfaceFn,
    GetVideoParamFn, Handle, HandleType, Payload, Platform, PluginHandle, Priority, QueryFn,
    QueryImplFn, QueryIoSurfFn, QueryPlatformFn, QueryVersionFn, SetFrameAllocatorFn,
    SetHandleFn, SetSkipModeFn, SkipMode, SurfaceHandle, SyncOperationFn, SyncPoint,
    UserRegisterFn, UserUnregisterFn, VideoParam, VppGetStatFn, VppRunFrameAsyncFn, VppStat,
};
use crate::error::{Error, Result};
use crate::ops::VideoOp;
use crate::status::Status;
use crate::version::ApiVersion;
use std::ptr;
use std::time::Duration;

/// Wait without a deadline in [`Session::sync_operation`].
pub const WAIT_INFINITE: Duration = Duration::MAX;

pub(super) fn check_bitstream(bs: &Bitstream<'_>) -> Result<()> {
    if bs.is_null() {
        return Err(Error::NullPointer);
    }
    Ok(())
}

fn check_surface(surface: &FrameSurface<'_>) -> Result<()> {
    if surface.is_null() {
        return Err(Error::NullPointer);
    }
    Ok(())
}

#[inline]
fn opt_ptr<T>(value: Option<&T>) -> *const T {
    value.map_or(ptr::null(), |v| v as *const T)
}

#[inline]
fn opt_mut<T>(value: Option<&mut T>) -> *mut T {
    value.map_or(ptr::null_mut(), |v| v as *mut T)
}

#[inline]
fn completed(status: Status, sync: SyncPoint) -> (Status, Option<SyncPoint>) {
    (status, (!sync.is_null()).then_some(sync))
}

/// Milliseconds for the native wait, saturating.
#[inline]
pub(super) fn wait_millis(timeout: Duration) -> u32 {
    u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX)
}

// Every `unsafe` block below forwards through `Session::forward` with the
// signature listed for the operation, and only passes pointers derived
// from references that outlive the call.

impl Session {
    // Session queries.

    /// The implementation code the backend reports (kind | interfaces).
    pub fn query_impl(&self) -> Result<u32> {
        let mut code = 0;
        unsafe { self.forward(VideoOp::QueryImpl, |f: QueryImplFn, s| f(s, &mut code)) }?;
        Ok(code)
    }

    /// The API version the backend reports.
    pub fn query_version(&self) -> Result<ApiVersion> {
        let mut version = ApiVersion::default();
        unsafe { self.forward(VideoOp::QueryVersion, |f: QueryVersionFn, s| f(s, &mut version)) }?;
        Ok(version)
    }

    /// The priority the backend applied to this native session.
    pub fn backend_priority(&self) -> Result<Priority> {
        let mut priority = Priority::NORMAL;
        unsafe { self.forward(VideoOp::GetPriority, |f: GetPriorityFn, s| f(s, &mut priority)) }?;
        Ok(priority)
    }

    // Core.

    /// Install an external frame allocator.
    pub fn set_frame_allocator(&mut self, allocator: &FrameAllocator) -> Result<Status> {
        self.ready()?;
        if allocator.alloc.is_none() || allocator.free.is_none() {
            return Err(Error::NullPointer);
        }
        unsafe {
            self.forward(VideoOp::CoreSetFrameAllocator, |f: SetFrameAllocatorFn, s| {
                f(s, allocator)
            })
        }
    }

    /// Attach a device handle.
    pub fn set_handle(&mut self, ty: HandleType, handle: Handle) -> Result<Status> {
        self.ready()?;
        if handle.0.is_null() {
            return Err(Error::NullPointer);
        }
        unsafe { self.forward(VideoOp::CoreSetHandle, |f: SetHandleFn, s| f(s, ty, handle)) }
    }

    /// Read back a device handle.
    pub fn get_handle(&self, ty: HandleType) -> Result<Handle> {
        let mut handle = Handle(ptr::null_mut());
        unsafe { self.forward(VideoOp::CoreGetHandle, |f: GetHandleFn, s| f(s, ty, &mut handle)) }?;
        Ok(handle)
    }

    /// Wait up to `timeout` for `sync` to complete.
    ///
    /// A zero timeout polls. Returns [`Status::WRN_IN_EXECUTION`] when the
    /// operation is still running at the deadline. Timeouts beyond
    /// `u32::MAX` milliseconds wait forever.
    pub fn sync_operation(&mut self, sync: SyncPoint, timeout: Duration) -> Result<Status> {
        self.ready()?;
        if sync.is_null() {
            return Err(Error::NullPointer);
        }
        let wait = wait_millis(timeout);
        unsafe {
            self.forward(VideoOp::CoreSyncOperation, |f: SyncOperationFn, s| f(s, sync, wait))
        }
    }

    /// Describe the platform the backend runs on.
    pub fn query_platform(&self) -> Result<Platform> {
        let mut platform = Platform::default();
        unsafe {
            self.forward(VideoOp::CoreQueryPlatform, |f: QueryPlatformFn, s| f(s, &mut platform))
        }?;
        Ok(platform)
    }

    /// Register a user plugin with the native session.
    pub fn user_register(&mut self, plugin_type: u32, plugin: PluginHandle) -> Result<Status> {
        self.ready()?;
        if plugin.0.is_null() {
            return Err(Error::NullPointer);
        }
        unsafe {
            self.forward(VideoOp::UserRegister, |f: UserRegisterFn, s| f(s, plugin_type, plugin))
        }
    }

    /// Unregister the user plugin of `plugin_type`.
    pub fn user_unregister(&mut self, plugin_type: u32) -> Result<Status> {
        unsafe { self.forward(VideoOp::UserUnregister, |f: UserUnregisterFn, s| f(s, plugin_type)) }
    }

    // Encode.

    /// Validate encoder parameters.
    ///
    /// With `input` set, `out` receives the corrected parameters. Without
    /// it, `out` flags which fields the encoder can configure.
    pub fn encode_query(&self, input: Option<&VideoParam>, out: &mut VideoParam) -> Result<Status> {
        let input = opt_ptr(input);
        unsafe { self.forward(VideoOp::EncodeQuery, |f: QueryFn, s| f(s, input, out)) }
    }

    /// Surface requirements of an encoder configured with `par`.
    pub fn encode_query_io_surf(
        &self,
        par: &VideoParam,
        request: &mut FrameAllocRequest,
    ) -> Result<Status> {
        unsafe { self.forward(VideoOp::EncodeQueryIoSurf, |f: QueryIoSurfFn, s| f(s, par, request)) }
    }

    /// Initialize the encoder.
    pub fn encode_init(&mut self, par: &VideoParam) -> Result<Status> {
        let status =
            unsafe { self.forward(VideoOp::EncodeInit, |f: ComponentInitFn, s| f(s, par)) }?;
        self.ready_mut()?.components.encode = true;
        Ok(status)
    }

    /// Reconfigure the running encoder.
    pub fn encode_reset(&mut self, par: &VideoParam) -> Result<Status> {
        unsafe { self.forward(VideoOp::EncodeReset, |f: ComponentInitFn, s| f(s, par)) }
    }

    /// Close the encoder. Buffered frames must be drained first.
    pub fn encode_close(&mut self) -> Result<Status> {
        let status = unsafe { self.forward(VideoOp::EncodeClose, |f: CloseFn, s| f(s)) }?;
        self.ready_mut()?.components.encode = false;
        Ok(status)
    }

    /// Read the active encoder parameters.
    pub fn encode_get_video_param(&self, out: &mut VideoParam) -> Result<Status> {
        unsafe { self.forward(VideoOp::EncodeGetVideoParam, |f: GetVideoParamFn, s| f(s, out)) }
    }

    /// Read encoder statistics.
    pub fn encode_get_encode_stat(&self) -> Result<EncodeStat> {
        let mut stat = EncodeStat::default();
        unsafe {
            self.forward(VideoOp::EncodeGetEncodeStat, |f: EncodeGetStatFn, s| f(s, &mut stat))
        }?;
        Ok(stat)
    }

    /// Submit `surface` for encoding, or drain with `None`.
    ///
    /// Output is appended to `bs`. The sync point is present when a packet
    /// was produced; `Err(MoreData)` means the encoder buffered the frame
    /// (or, when draining, that nothing is left).
    pub fn encode_frame_async(
        &mut self,
        ctrl: Option<&EncodeCtrl>,
        surface: Option<&mut FrameSurface<'_>>,
        bs: &mut Bitstream<'_>,
    ) -> Result<(Status, Option<SyncPoint>)> {
        self.ready()?;
        check_bitstream(bs)?;
        if let Some(surface) = surface.as_deref() {
            check_surface(surface)?;
        }
        let ctrl = opt_ptr(ctrl);
        let surface = opt_mut(surface);
        let mut sync = SyncPoint::NULL;
        let status = unsafe {
            self.forward(VideoOp::EncodeFrameAsync, |f: EncodeFrameAsyncFn, s| {
                f(s, ctrl, surface, bs, &mut sync)
            })
        }?;
        Ok(completed(status, sync))
    }

    // Decode.

    /// Validate decoder parameters; see [`Session::encode_query`].
    pub fn decode_query(&self, input: Option<&VideoParam>, out: &mut VideoParam) -> Result<Status> {
        let input = opt_ptr(input);
        unsafe { self.forward(VideoOp::DecodeQuery, |f: QueryFn, s| f(s, input, out)) }
    }

    /// Parse stream headers from `bs` into `out`.
    pub fn decode_header(&self, bs: &mut Bitstream<'_>, out: &mut VideoParam) -> Result<Status> {
        self.ready()?;
        check_bitstream(bs)?;
        unsafe { self.forward(VideoOp::DecodeHeader, |f: DecodeHeaderFn, s| f(s, bs, out)) }
    }

    /// Surface requirements of a decoder configured with `par`.
    pub fn decode_query_io_surf(
        &self,
        par: &VideoParam,
        request: &mut FrameAllocRequest,
    ) -> Result<Status> {
        unsafe { self.forward(VideoOp::DecodeQueryIoSurf, |f: QueryIoSurfFn, s| f(s, par, request)) }
    }

    /// Initialize the decoder.
    pub fn decode_init(&mut self, par: &VideoParam) -> Result<Status> {
        let status =
            unsafe { self.forward(VideoOp::DecodeInit, |f: ComponentInitFn, s| f(s, par)) }?;
        self.ready_mut()?.components.decode = true;
        Ok(status)
    }

    /// Reconfigure the running decoder.
    pub fn decode_reset(&mut self, par: &VideoParam) -> Result<Status> {
        unsafe { self.forward(VideoOp::DecodeReset, |f: ComponentInitFn, s| f(s, par)) }
    }

    /// Close the decoder.
    pub fn decode_close(&mut self) -> Result<Status> {
        let status = unsafe { self.forward(VideoOp::DecodeClose, |f: CloseFn, s| f(s)) }?;
        self.ready_mut()?.components.decode = false;
        Ok(status)
    }

    /// Read the active decoder parameters.
    pub fn decode_get_video_param(&self, out: &mut VideoParam) -> Result<Status> {
        unsafe { self.forward(VideoOp::DecodeGetVideoParam, |f: GetVideoParamFn, s| f(s, out)) }
    }

    /// Read decoder statistics.
    pub fn decode_get_decode_stat(&self) -> Result<DecodeStat> {
        let mut stat = DecodeStat::default();
        unsafe {
            self.forward(VideoOp::DecodeGetDecodeStat, |f: DecodeGetStatFn, s| f(s, &mut stat))
        }?;
        Ok(stat)
    }

    /// Adjust decoder frame skipping.
    pub fn decode_set_skip_mode(&mut self, mode: SkipMode) -> Result<Status> {
        unsafe { self.forward(VideoOp::DecodeSetSkipMode, |f: SetSkipModeFn, s| f(s, mode)) }
    }

    /// Fetch the next user payload into `payload`; returns its timestamp.
    pub fn decode_get_payload(&mut self, payload: &mut Payload<'_>) -> Result<u64> {
        self.ready()?;
        if payload.is_null() {
            return Err(Error::NullPointer);
        }
        let mut timestamp = 0;
        unsafe {
            self.forward(VideoOp::DecodeGetPayload, |f: GetPayloadFn, s| {
                f(s, &mut timestamp, payload)
            })
        }?;
        Ok(timestamp)
    }

    /// Decode from `bs` (or drain with `None`) into `work`.
    pub fn decode_frame_async(
        &mut self,
        bs: Option<&mut Bitstream<'_>>,
        work: &mut FrameSurface<'_>,
    ) -> Result<(Status, Option<SyncPoint>)> {
        self.ready()?;
        if let Some(bs) = bs.as_deref() {
            check_bitstream(bs)?;
        }
        check_surface(work)?;
        let bs = opt_mut(bs);
        let mut sync = SyncPoint::NULL;
        let status = unsafe {
            self.forward(VideoOp::DecodeFrameAsync, |f: DecodeFrameAsyncFn, s| {
                f(s, bs, work, &mut sync)
            })
        }?;
        Ok(completed(status, sync))
    }

    // VPP.

    /// Validate VPP parameters; see [`Session::encode_query`].
    pub fn vpp_query(&self, input: Option<&VideoParam>, out: &mut VideoParam) -> Result<Status> {
        let input = opt_ptr(input);
        unsafe { self.forward(VideoOp::VppQuery, |f: QueryFn, s| f(s, input, out)) }
    }

    /// Surface requirements of VPP configured with `par`: input, then output.
    pub fn vpp_query_io_surf(
        &self,
        par: &VideoParam,
        requests: &mut [FrameAllocRequest; 2],
    ) -> Result<Status> {
        let requests = requests.as_mut_ptr();
        unsafe { self.forward(VideoOp::VppQueryIoSurf, |f: QueryIoSurfFn, s| f(s, par, requests)) }
    }

    /// Initialize VPP.
    pub fn vpp_init(&mut self, par: &VideoParam) -> Result<Status> {
        let status = unsafe { self.forward(VideoOp::VppInit, |f: ComponentInitFn, s| f(s, par)) }?;
        self.ready_mut()?.components.vpp = true;
        Ok(status)
    }

    /// Reconfigure running VPP.
    pub fn vpp_reset(&mut self, par: &VideoParam) -> Result<Status> {
        unsafe { self.forward(VideoOp::VppReset, |f: ComponentInitFn, s| f(s, par)) }
    }

    /// Close VPP.
    pub fn vpp_close(&mut self) -> Result<Status> {
        let status = unsafe { self.forward(VideoOp::VppClose, |f: CloseFn, s| f(s)) }?;
        self.ready_mut()?.components.vpp = false;
        Ok(status)
    }

    /// Read the active VPP parameters.
    pub fn vpp_get_video_param(&self, out: &mut VideoParam) -> Result<Status> {
        unsafe { self.forward(VideoOp::VppGetVideoParam, |f: GetVideoParamFn, s| f(s, out)) }
    }

    /// Read VPP statistics.
    pub fn vpp_get_vpp_stat(&self) -> Result<VppStat> {
        let mut stat = VppStat::default();
        unsafe { self.forward(VideoOp::VppGetVppStat, |f: VppGetStatFn, s| f(s, &mut stat)) }?;
        Ok(stat)
    }

    /// Process `input` (or drain with `None`) into `output`.
    pub fn vpp_run_frame_async(
        &mut self,
        input: Option<&mut FrameSurface<'_>>,
        output: &mut FrameSurface<'_>,
    ) -> Result<(Status, Option<SyncPoint>)> {
        self.ready()?;
        if let Some(input) = input.as_deref() {
            check_surface(input)?;
        }
        check_surface(output)?;
        let input = opt_mut(input);
        let mut sync = SyncPoint::NULL;
        let status = unsafe {
            self.forward(VideoOp::VppRunFrameAsync, |f: VppRunFrameAsyncFn, s| {
                f(s, input, output, &mut sync)
            })
        }?;
        Ok(completed(status, sync))
    }

    // Memory (API 2.0).

    /// Borrow an encoder input surface from the backend.
    pub fn memory_get_surface_for_encode(&self) -> Result<SurfaceHandle> {
        self.get_surface(VideoOp::MemoryGetSurfaceForEncode)
    }

    /// Borrow a decoder output surface from the backend.
    pub fn memory_get_surface_for_decode(&self) -> Result<SurfaceHandle> {
        self.get_surface(VideoOp::MemoryGetSurfaceForDecode)
    }

    /// Borrow a VPP input surface from the backend.
    pub fn memory_get_surface_for_vpp(&self) -> Result<SurfaceHandle> {
        self.get_surface(VideoOp::MemoryGetSurfaceForVpp)
    }

    fn get_surface(&self, op: VideoOp) -> Result<SurfaceHandle> {
        let mut surface = SurfaceHandle(ptr::null_mut());
        unsafe { self.forward(op, |f: GetSurfaceFn, s| f(s, &mut surface)) }?;
        if surface.0.is_null() {
            return Err(Error::NullPointer);
        }
        Ok(surface)
    }
}
