//! Audio trampolines.
//!
//! Same shape as the video ones, over the audio function table. Audio
//! operations only exist from API 1.8 on; sessions initialized for an older
//! version report every audio operation as not implemented.

use super::dispatch::{check_bitstream, wait_millis};
use super::{Session, lookup};
use crate::abi::{
    AudioAllocRequest, AudioDecodeFrameAsyncFn, AudioDecodeHeaderFn, AudioEncodeFrameAsyncFn,
    AudioFrame, AudioGetParamFn, AudioInitFn, AudioParam, AudioQueryFn, AudioQueryIoSizeFn,
    Bitstream, CloseFn, NativeSession, SyncOperationFn, SyncPoint,
};
use crate::error::{Error, Result};
use crate::ops::{AudioOp, Operation};
use crate::status::Status;
use std::ptr;
use std::time::Duration;

fn check_frame(frame: &AudioFrame<'_>) -> Result<()> {
    if frame.is_null() {
        return Err(Error::NullPointer);
    }
    Ok(())
}

impl Session {
    /// Forward an audio operation to the bound backend.
    ///
    /// # Safety
    ///
    /// Same contract as [`Session::forward`].
    unsafe fn forward_audio<F: Copy>(
        &self,
        op: AudioOp,
        call: impl FnOnce(F, NativeSession) -> Status,
    ) -> Result<Status> {
        let bound = self.ready()?;
        // SAFETY: forwarded to the caller.
        let entry = unsafe { lookup::<_, F>(&bound.backend.audio, op) }?;
        let _session = self.span.enter();
        let _call = self
            .context
            .config()
            .tracing
            .call_span(self.id, op.name())
            .entered();
        call(entry, bound.native).into_result()
    }

    /// Wait up to `timeout` for an audio sync point.
    pub fn audio_sync_operation(&mut self, sync: SyncPoint, timeout: Duration) -> Result<Status> {
        self.ready()?;
        if sync.is_null() {
            return Err(Error::NullPointer);
        }
        let wait = wait_millis(timeout);
        unsafe {
            self.forward_audio(AudioOp::SyncOperation, |f: SyncOperationFn, s| f(s, sync, wait))
        }
    }

    /// Validate audio encoder parameters.
    pub fn audio_encode_query(
        &self,
        input: Option<&AudioParam>,
        out: &mut AudioParam,
    ) -> Result<Status> {
        let input = input.map_or(ptr::null(), |p| p as *const AudioParam);
        unsafe { self.forward_audio(AudioOp::EncodeQuery, |f: AudioQueryFn, s| f(s, input, out)) }
    }

    /// Buffer sizes for an audio encoder configured with `par`.
    pub fn audio_encode_query_io_size(
        &self,
        par: &AudioParam,
        request: &mut AudioAllocRequest,
    ) -> Result<Status> {
        unsafe {
            self.forward_audio(AudioOp::EncodeQueryIoSize, |f: AudioQueryIoSizeFn, s| {
                f(s, par, request)
            })
        }
    }

    /// Initialize the audio encoder.
    pub fn audio_encode_init(&mut self, par: &AudioParam) -> Result<Status> {
        let status =
            unsafe { self.forward_audio(AudioOp::EncodeInit, |f: AudioInitFn, s| f(s, par)) }?;
        self.ready_mut()?.components.audio_encode = true;
        Ok(status)
    }

    /// Reconfigure the running audio encoder.
    pub fn audio_encode_reset(&mut self, par: &AudioParam) -> Result<Status> {
        unsafe { self.forward_audio(AudioOp::EncodeReset, |f: AudioInitFn, s| f(s, par)) }
    }

    /// Close the audio encoder.
    pub fn audio_encode_close(&mut self) -> Result<Status> {
        let status = unsafe { self.forward_audio(AudioOp::EncodeClose, |f: CloseFn, s| f(s)) }?;
        self.ready_mut()?.components.audio_encode = false;
        Ok(status)
    }

    /// Read the active audio encoder parameters.
    pub fn audio_encode_get_audio_param(&self, out: &mut AudioParam) -> Result<Status> {
        unsafe {
            self.forward_audio(AudioOp::EncodeGetAudioParam, |f: AudioGetParamFn, s| f(s, out))
        }
    }

    /// Encode one audio frame into `bs`.
    pub fn audio_encode_frame_async(
        &mut self,
        frame: &mut AudioFrame<'_>,
        bs: &mut Bitstream<'_>,
    ) -> Result<(Status, Option<SyncPoint>)> {
        self.ready()?;
        check_frame(frame)?;
        check_bitstream(bs)?;
        let mut sync = SyncPoint::NULL;
        let status = unsafe {
            self.forward_audio(AudioOp::EncodeFrameAsync, |f: AudioEncodeFrameAsyncFn, s| {
                f(s, frame, bs, &mut sync)
            })
        }?;
        Ok((status, (!sync.is_null()).then_some(sync)))
    }

    /// Validate audio decoder parameters.
    pub fn audio_decode_query(
        &self,
        input: Option<&AudioParam>,
        out: &mut AudioParam,
    ) -> Result<Status> {
        let input = input.map_or(ptr::null(), |p| p as *const AudioParam);
        unsafe { self.forward_audio(AudioOp::DecodeQuery, |f: AudioQueryFn, s| f(s, input, out)) }
    }

    /// Parse audio stream headers from `bs` into `out`.
    pub fn audio_decode_header(
        &self,
        bs: &mut Bitstream<'_>,
        out: &mut AudioParam,
    ) -> Result<Status> {
        self.ready()?;
        check_bitstream(bs)?;
        unsafe {
            self.forward_audio(AudioOp::DecodeHeader, |f: AudioDecodeHeaderFn, s| f(s, bs, out))
        }
    }

    /// Initialize the audio decoder.
    pub fn audio_decode_init(&mut self, par: &AudioParam) -> Result<Status> {
        let status =
            unsafe { self.forward_audio(AudioOp::DecodeInit, |f: AudioInitFn, s| f(s, par)) }?;
        self.ready_mut()?.components.audio_decode = true;
        Ok(status)
    }

    /// Reconfigure the running audio decoder.
    pub fn audio_decode_reset(&mut self, par: &AudioParam) -> Result<Status> {
        unsafe { self.forward_audio(AudioOp::DecodeReset, |f: AudioInitFn, s| f(s, par)) }
    }

    /// Close the audio decoder.
    pub fn audio_decode_close(&mut self) -> Result<Status> {
        let status = unsafe { self.forward_audio(AudioOp::DecodeClose, |f: CloseFn, s| f(s)) }?;
        self.ready_mut()?.components.audio_decode = false;
        Ok(status)
    }

    /// Buffer sizes for an audio decoder configured with `par`.
    pub fn audio_decode_query_io_size(
        &self,
        par: &AudioParam,
        request: &mut AudioAllocRequest,
    ) -> Result<Status> {
        unsafe {
            self.forward_audio(AudioOp::DecodeQueryIoSize, |f: AudioQueryIoSizeFn, s| {
                f(s, par, request)
            })
        }
    }

    /// Read the active audio decoder parameters.
    pub fn audio_decode_get_audio_param(&self, out: &mut AudioParam) -> Result<Status> {
        unsafe {
            self.forward_audio(AudioOp::DecodeGetAudioParam, |f: AudioGetParamFn, s| f(s, out))
        }
    }

    /// Decode from `bs` (or drain with `None`) into `frame`.
    pub fn audio_decode_frame_async(
        &mut self,
        bs: Option<&mut Bitstream<'_>>,
        frame: &mut AudioFrame<'_>,
    ) -> Result<(Status, Option<SyncPoint>)> {
        self.ready()?;
        if let Some(bs) = bs.as_deref() {
            check_bitstream(bs)?;
        }
        check_frame(frame)?;
        let bs = bs.map_or(ptr::null_mut(), |b| b as *mut Bitstream<'_>);
        let mut sync = SyncPoint::NULL;
        let status = unsafe {
            self.forward_audio(AudioOp::DecodeFrameAsync, |f: AudioDecodeFrameAsyncFn, s| {
                f(s, bs, frame, &mut sync)
            })
        }?;
        Ok((status, (!sync.is_null()).then_some(sync)))
    }
}
