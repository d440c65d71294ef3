//! Audio payloads.

use std::marker::PhantomData;
use std::ptr;

/// Parameters of an audio encoder or decoder.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AudioParam {
    /// Codec identifier.
    pub codec_id: u32,
    /// Codec profile.
    pub codec_profile: u16,
    /// Maximum number of in-flight asynchronous operations.
    pub async_depth: u16,
    /// Bitrate in bits per second.
    pub bitrate: u32,
    /// Sample rate in Hz.
    pub sample_frequency: u32,
    /// Channel count.
    pub num_channel: u16,
    /// Bits per sample.
    pub bits_per_sample: u16,
}

/// Buffer requirements reported by `QueryIoSize`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AudioAllocRequest {
    /// Suggested input buffer size in bytes.
    pub suggested_input_size: u32,
    /// Suggested output buffer size in bytes.
    pub suggested_output_size: u32,
}

/// A block of PCM samples.
///
/// The sample pointer and lengths are private and always stay inside the
/// borrowed storage.
#[repr(C)]
#[derive(Debug)]
pub struct AudioFrame<'a> {
    data: *mut u8,
    data_length: u32,
    max_length: u32,
    /// Presentation timestamp.
    pub timestamp: u64,
    /// Channel count.
    pub num_channels: u16,
    /// Bits per sample.
    pub bits_per_sample: u16,
    _storage: PhantomData<&'a mut [u8]>,
}

impl<'a> AudioFrame<'a> {
    /// A frame over `storage` with the first `len` bytes valid.
    pub fn from_slice(storage: &'a mut [u8], len: usize) -> Self {
        let max_length = u32::try_from(storage.len()).unwrap_or(u32::MAX);
        Self {
            data: storage.as_mut_ptr(),
            data_length: u32::try_from(len).unwrap_or(max_length).min(max_length),
            max_length,
            timestamp: 0,
            num_channels: 0,
            bits_per_sample: 0,
            _storage: PhantomData,
        }
    }

    /// A frame with no storage.
    pub fn null() -> Self {
        Self {
            data: ptr::null_mut(),
            data_length: 0,
            max_length: 0,
            timestamp: 0,
            num_channels: 0,
            bits_per_sample: 0,
            _storage: PhantomData,
        }
    }

    /// True when the frame has no storage.
    pub fn is_null(&self) -> bool {
        self.data.is_null()
    }

    /// Number of valid bytes.
    pub fn data_length(&self) -> u32 {
        self.data_length.min(self.max_length)
    }

    /// Capacity of the storage.
    pub fn max_length(&self) -> u32 {
        self.max_length
    }

    /// Mark the first `len` bytes as valid, clamped to the storage.
    pub fn set_data_length(&mut self, len: usize) {
        self.data_length = u32::try_from(len).unwrap_or(u32::MAX).min(self.max_length);
    }

    /// The valid samples.
    pub fn as_bytes(&self) -> &[u8] {
        if self.data.is_null() {
            return &[];
        }
        // SAFETY: `data` covers `max_length` bytes borrowed for `'a`, and
        // `data_length()` never exceeds it.
        unsafe { std::slice::from_raw_parts(self.data, self.data_length() as usize) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_length_is_clamped() {
        let mut storage = [5u8; 8];
        let mut frame = AudioFrame::from_slice(&mut storage, 100);
        assert_eq!(frame.data_length(), 8);
        frame.set_data_length(3);
        assert_eq!(frame.as_bytes(), &[5, 5, 5]);
        frame.set_data_length(usize::MAX);
        assert_eq!(frame.as_bytes().len(), 8);
        assert!(AudioFrame::null().as_bytes().is_empty());
    }
}
