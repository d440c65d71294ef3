//! Native entry point signatures, one per operation.
//!
//! A slot resolved for an operation is only ever cast to the alias listed
//! next to that operation here.

use super::{
    AudioAllocRequest, AudioFrame, AudioParam, Bitstream, DecodeStat, EncodeCtrl, EncodeStat,
    FrameAllocRequest, FrameAllocator, FrameSurface, Handle, HandleType, InitParam,
    NativeSession, Payload, Platform, PluginHandle, PluginUid, Priority, SkipMode,
    SurfaceHandle, SyncPoint, VideoParam, VppStat,
};
use crate::status::Status;
use crate::version::ApiVersion;
use std::ffi::c_char;

// Session.

/// `Init(impl_code, version, out_session)`.
pub type InitFn = unsafe extern "C" fn(u32, *mut ApiVersion, *mut NativeSession) -> Status;
/// `InitEx(params, out_session)`.
pub type InitExFn = unsafe extern "C" fn(*const InitParam, *mut NativeSession) -> Status;
/// `Close`, and every component close.
pub type CloseFn = unsafe extern "C" fn(NativeSession) -> Status;
/// `QueryImpl(session, out_impl_code)`.
pub type QueryImplFn = unsafe extern "C" fn(NativeSession, *mut u32) -> Status;
/// `QueryVersion(session, out_version)`.
pub type QueryVersionFn = unsafe extern "C" fn(NativeSession, *mut ApiVersion) -> Status;
/// `JoinSession(parent, child)`.
pub type JoinSessionFn = unsafe extern "C" fn(NativeSession, NativeSession) -> Status;
/// `CloneSession(session, out_clone)`.
pub type CloneSessionFn = unsafe extern "C" fn(NativeSession, *mut NativeSession) -> Status;
/// `SetPriority(session, priority)`.
pub type SetPriorityFn = unsafe extern "C" fn(NativeSession, Priority) -> Status;
/// `GetPriority(session, out_priority)`.
pub type GetPriorityFn = unsafe extern "C" fn(NativeSession, *mut Priority) -> Status;

// Core.

/// `SetFrameAllocator(session, allocator)`.
pub type SetFrameAllocatorFn =
    unsafe extern "C" fn(NativeSession, *const FrameAllocator) -> Status;
/// `SetHandle(session, type, handle)`.
pub type SetHandleFn = unsafe extern "C" fn(NativeSession, HandleType, Handle) -> Status;
/// `GetHandle(session, type, out_handle)`.
pub type GetHandleFn = unsafe extern "C" fn(NativeSession, HandleType, *mut Handle) -> Status;
/// `SyncOperation(session, sync, wait_ms)`, shared with audio.
pub type SyncOperationFn = unsafe extern "C" fn(NativeSession, SyncPoint, u32) -> Status;
/// `QueryPlatform(session, out_platform)`.
pub type QueryPlatformFn = unsafe extern "C" fn(NativeSession, *mut Platform) -> Status;

// Components (encode/decode/VPP share these shapes).

/// `Query(session, in_or_null, out)`.
pub type QueryFn =
    unsafe extern "C" fn(NativeSession, *const VideoParam, *mut VideoParam) -> Status;
/// `QueryIoSurf(session, params, out_request)`; VPP writes two requests.
pub type QueryIoSurfFn =
    unsafe extern "C" fn(NativeSession, *const VideoParam, *mut FrameAllocRequest) -> Status;
/// `Init` and `Reset`.
pub type ComponentInitFn = unsafe extern "C" fn(NativeSession, *const VideoParam) -> Status;
/// `GetVideoParam(session, out_params)`.
pub type GetVideoParamFn = unsafe extern "C" fn(NativeSession, *mut VideoParam) -> Status;
/// `EncodeFrameAsync(session, ctrl_or_null, surface_or_null, bs, out_sync)`.
pub type EncodeFrameAsyncFn = unsafe extern "C" fn(
    NativeSession,
    *const EncodeCtrl,
    *mut FrameSurface<'_>,
    *mut Bitstream<'_>,
    *mut SyncPoint,
) -> Status;
/// `GetEncodeStat(session, out_stat)`.
pub type EncodeGetStatFn = unsafe extern "C" fn(NativeSession, *mut EncodeStat) -> Status;
/// `DecodeHeader(session, bs, out_params)`.
pub type DecodeHeaderFn =
    unsafe extern "C" fn(NativeSession, *mut Bitstream<'_>, *mut VideoParam) -> Status;
/// `DecodeFrameAsync(session, bs_or_null, work_surface, out_sync)`.
pub type DecodeFrameAsyncFn = unsafe extern "C" fn(
    NativeSession,
    *mut Bitstream<'_>,
    *mut FrameSurface<'_>,
    *mut SyncPoint,
) -> Status;
/// `GetDecodeStat(session, out_stat)`.
pub type DecodeGetStatFn = unsafe extern "C" fn(NativeSession, *mut DecodeStat) -> Status;
/// `SetSkipMode(session, mode)`.
pub type SetSkipModeFn = unsafe extern "C" fn(NativeSession, SkipMode) -> Status;
/// `GetPayload(session, out_timestamp, payload)`.
pub type GetPayloadFn = unsafe extern "C" fn(NativeSession, *mut u64, *mut Payload<'_>) -> Status;
/// `RunFrameVppAsync(session, in, out, out_sync)`.
pub type VppRunFrameAsyncFn = unsafe extern "C" fn(
    NativeSession,
    *mut FrameSurface<'_>,
    *mut FrameSurface<'_>,
    *mut SyncPoint,
) -> Status;
/// `GetVppStat(session, out_stat)`.
pub type VppGetStatFn = unsafe extern "C" fn(NativeSession, *mut VppStat) -> Status;
/// `GetSurfaceFor*(session, out_surface)`.
pub type GetSurfaceFn = unsafe extern "C" fn(NativeSession, *mut SurfaceHandle) -> Status;

// User plugins.

/// `UserRegister(session, plugin_type, plugin)`.
pub type UserRegisterFn = unsafe extern "C" fn(NativeSession, u32, PluginHandle) -> Status;
/// `UserUnregister(session, plugin_type)`.
pub type UserUnregisterFn = unsafe extern "C" fn(NativeSession, u32) -> Status;
/// `UserLoad(session, uid, version)`.
pub type UserLoadFn = unsafe extern "C" fn(NativeSession, *const PluginUid, u32) -> Status;
/// `UserLoadByPath(session, uid, version, path, path_len)`.
pub type UserLoadByPathFn =
    unsafe extern "C" fn(NativeSession, *const PluginUid, u32, *const c_char, u32) -> Status;
/// `UserUnload(session, uid)`.
pub type UserUnloadFn = unsafe extern "C" fn(NativeSession, *const PluginUid) -> Status;

/// Plugin module `Create(uid, version, out_handle, out_type)`.
pub type PluginCreateFn =
    unsafe extern "C" fn(*const PluginUid, u32, *mut PluginHandle, *mut u32) -> Status;
/// Plugin module `Release(handle)`.
pub type PluginReleaseFn = unsafe extern "C" fn(PluginHandle) -> Status;

// Audio.

/// `Audio*Query(session, in_or_null, out)`.
pub type AudioQueryFn =
    unsafe extern "C" fn(NativeSession, *const AudioParam, *mut AudioParam) -> Status;
/// `Audio*QueryIoSize(session, params, out_request)`.
pub type AudioQueryIoSizeFn =
    unsafe extern "C" fn(NativeSession, *const AudioParam, *mut AudioAllocRequest) -> Status;
/// `Audio*Init` and `Audio*Reset`.
pub type AudioInitFn = unsafe extern "C" fn(NativeSession, *const AudioParam) -> Status;
/// `Audio*GetAudioParam(session, out_params)`.
pub type AudioGetParamFn = unsafe extern "C" fn(NativeSession, *mut AudioParam) -> Status;
/// `AudioDecodeHeader(session, bs, out_params)`.
pub type AudioDecodeHeaderFn =
    unsafe extern "C" fn(NativeSession, *mut Bitstream<'_>, *mut AudioParam) -> Status;
/// `AudioEncodeFrameAsync(session, frame, bs, out_sync)`.
pub type AudioEncodeFrameAsyncFn = unsafe extern "C" fn(
    NativeSession,
    *mut AudioFrame<'_>,
    *mut Bitstream<'_>,
    *mut SyncPoint,
) -> Status;
/// `AudioDecodeFrameAsync(session, bs, frame, out_sync)`.
pub type AudioDecodeFrameAsyncFn = unsafe extern "C" fn(
    NativeSession,
    *mut Bitstream<'_>,
    *mut AudioFrame<'_>,
    *mut SyncPoint,
) -> Status;
