//! C ABI shared between the dispatcher and backends.
//!
//! Everything here is `#[repr(C)]` or `#[repr(transparent)]` and passed
//! across the native boundary unchanged. Payload structs are opaque to the
//! dispatcher: it checks pointers and forwards, backends interpret fields.

mod audio;
mod signatures;
mod video;

pub use audio::{AudioAllocRequest, AudioFrame, AudioParam};
pub use signatures::*;
pub use video::{
    Bitstream, DecodeStat, EncodeCtrl, EncodeStat, FrameAllocRequest, FrameAllocResponse,
    FrameAllocator, FrameInfo, FrameSurface, Payload, Platform, SkipMode, SurfaceHandle,
    VideoParam, VppStat, codec, fourcc, gop, io_pattern, level, profile, rate_control,
    target_usage,
};

use crate::version::ApiVersion;
use bitflags::bitflags;
use std::ffi::c_void;
use std::fmt;
use std::ptr::{self, NonNull};
use std::str::FromStr;

/// Opaque native session owned by a backend.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeSession(pub *mut c_void);

impl NativeSession {
    /// The null session.
    pub const NULL: NativeSession = NativeSession(ptr::null_mut());

    /// Whether the backend left this session unset.
    #[inline]
    pub fn is_null(self) -> bool {
        self.0.is_null()
    }
}

/// Completion token returned by asynchronous-style operations.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SyncPoint(pub *mut c_void);

impl SyncPoint {
    /// The null token.
    pub const NULL: SyncPoint = SyncPoint(ptr::null_mut());

    /// Whether no work was scheduled.
    #[inline]
    pub fn is_null(self) -> bool {
        self.0.is_null()
    }
}

/// Opaque plugin instance created by a plugin module.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PluginHandle(pub *mut c_void);

impl PluginHandle {
    /// The null handle.
    pub const NULL: PluginHandle = PluginHandle(ptr::null_mut());

    /// Whether this is the null handle.
    #[inline]
    pub fn is_null(self) -> bool {
        self.0.is_null()
    }
}

/// Device handle attached to a native session.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handle(pub *mut c_void);

/// Kind of device handle.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleType(pub i32);

impl HandleType {
    /// Direct3D 9 device manager.
    pub const D3D9_DEVICE_MANAGER: HandleType = HandleType(1);
    /// Direct3D 11 device.
    pub const D3D11_DEVICE: HandleType = HandleType(2);
    /// VA-API display.
    pub const VA_DISPLAY: HandleType = HandleType(4);
}

/// Scheduling priority of a session.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Priority(pub i32);

impl Priority {
    /// Background work.
    pub const LOW: Priority = Priority(0);
    /// Default.
    pub const NORMAL: Priority = Priority(1);
    /// Latency-sensitive work.
    pub const HIGH: Priority = Priority(2);
}

impl Default for Priority {
    fn default() -> Self {
        Self::NORMAL
    }
}

/// Implementation kind of a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImplKind {
    /// Hardware accelerated.
    Hardware,
    /// Software only.
    Software,
    /// Pseudo/test backend.
    Pseudo,
}

impl ImplKind {
    /// Every kind, in default selection order.
    pub const ALL: [ImplKind; 3] = [Self::Hardware, Self::Software, Self::Pseudo];

    /// Mask selecting the kind from an implementation code.
    pub const CODE_MASK: u32 = 0xFF;

    /// Wire code of this kind.
    pub const fn code(self) -> u32 {
        match self {
            Self::Software => 1,
            Self::Hardware => 2,
            Self::Pseudo => 3,
        }
    }

    /// Decode the kind part of an implementation code.
    pub const fn from_code(code: u32) -> Option<Self> {
        match code & Self::CODE_MASK {
            1 => Some(Self::Software),
            2 => Some(Self::Hardware),
            3 => Some(Self::Pseudo),
            _ => None,
        }
    }

    /// Lowercase name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hardware => "hardware",
            Self::Software => "software",
            Self::Pseudo => "pseudo",
        }
    }
}

impl fmt::Display for ImplKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImplKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hardware" | "hw" => Ok(Self::Hardware),
            "software" | "sw" => Ok(Self::Software),
            "pseudo" => Ok(Self::Pseudo),
            other => Err(format!("unknown implementation kind '{other}'")),
        }
    }
}

bitflags! {
    /// Acceleration interfaces a backend supports.
    ///
    /// An empty set in a request means "any interface".
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct InterfaceFlags: u32 {
        /// VA-API.
        const VAAPI = 1 << 8;
        /// Direct3D 11.
        const D3D11 = 1 << 9;
        /// Direct3D 9.
        const D3D9 = 1 << 10;
        /// Plain system memory.
        const SYSTEM_MEMORY = 1 << 11;
    }
}

impl InterfaceFlags {
    /// Whether a backend offering `self` can serve `requested`.
    #[inline]
    pub fn satisfies(self, requested: InterfaceFlags) -> bool {
        requested.is_empty() || self.contains(requested)
    }
}

/// Combine a kind and interface set into the code passed to a backend's init.
#[inline]
pub const fn impl_code(kind: Option<ImplKind>, interfaces: InterfaceFlags) -> u32 {
    let kind = match kind {
        Some(kind) => kind.code(),
        None => 0,
    };
    kind | interfaces.bits()
}

/// Extended init parameters.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InitParam {
    /// Implementation code (kind | interfaces).
    pub implementation: u32,
    /// Requested API version.
    pub version: ApiVersion,
    /// Non-zero when the caller provides worker threads.
    pub external_threads: u16,
    /// GPU copy mode.
    pub gpu_copy: u16,
    /// Reserved, must be zero.
    pub reserved: [u32; 4],
}

/// 16-byte plugin identifier.
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct PluginUid(pub [u8; 16]);

impl fmt::Display for PluginUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for PluginUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PluginUid({self})")
    }
}

impl FromStr for PluginUid {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex: Vec<u8> = s.bytes().filter(|b| *b != b'-').collect();
        if hex.len() != 32 {
            return Err(format!("plugin uid '{s}' must have 32 hex digits"));
        }
        let mut uid = [0u8; 16];
        for (i, pair) in hex.chunks_exact(2).enumerate() {
            let pair = std::str::from_utf8(pair).map_err(|e| e.to_string())?;
            uid[i] = u8::from_str_radix(pair, 16)
                .map_err(|_| format!("plugin uid '{s}' is not hexadecimal"))?;
        }
        Ok(Self(uid))
    }
}

/// A resolved native entry point.
///
/// Only meaningful together with the operation it was resolved for, which
/// fixes the signature it is cast back to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawEntry(NonNull<c_void>);

// SAFETY: an entry point is a code address; calling it is what needs care,
// and every call site is `unsafe`.
unsafe impl Send for RawEntry {}
unsafe impl Sync for RawEntry {}

impl RawEntry {
    /// Wrap a code address, rejecting null.
    pub fn new(ptr: *const c_void) -> Option<Self> {
        NonNull::new(ptr.cast_mut()).map(Self)
    }

    /// The code address.
    pub fn as_ptr(self) -> *const c_void {
        self.0.as_ptr()
    }

    /// Reinterpret as a function pointer type.
    ///
    /// # Safety
    ///
    /// `F` must be the `extern "C"` function pointer type matching the
    /// exported symbol this entry was resolved from.
    #[inline]
    pub unsafe fn cast<F: Copy>(self) -> F {
        const {
            assert!(std::mem::size_of::<F>() == std::mem::size_of::<*const c_void>());
        }
        // SAFETY: sizes match and the caller vouches for the signature.
        unsafe { std::mem::transmute_copy(&self.0) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_impl_kind_codes() {
        for kind in ImplKind::ALL {
            assert_eq!(ImplKind::from_code(kind.code()), Some(kind));
        }
        let code = impl_code(Some(ImplKind::Hardware), InterfaceFlags::VAAPI);
        assert_eq!(ImplKind::from_code(code), Some(ImplKind::Hardware));
        assert_eq!(ImplKind::from_code(0), None);
    }

    #[test]
    fn test_interface_satisfies() {
        let offered = InterfaceFlags::VAAPI | InterfaceFlags::SYSTEM_MEMORY;
        assert!(offered.satisfies(InterfaceFlags::empty()));
        assert!(offered.satisfies(InterfaceFlags::VAAPI));
        assert!(!offered.satisfies(InterfaceFlags::D3D11));
    }

    #[test]
    fn test_plugin_uid_text() {
        let uid: PluginUid = "33a61c0b-4c27-454c-a8d8-5a0f1e2bc5a1".parse().unwrap();
        assert_eq!(uid.to_string(), "33a61c0b4c27454ca8d85a0f1e2bc5a1");
        assert_eq!(uid.0[0], 0x33);
        assert!("1234".parse::<PluginUid>().is_err());
        assert!("zz".repeat(16).parse::<PluginUid>().is_err());
    }

    #[test]
    fn test_raw_entry_rejects_null() {
        assert!(RawEntry::new(std::ptr::null()).is_none());
    }

    #[test]
    fn test_raw_entry_cast() {
        unsafe extern "C" fn answer() -> i32 {
            42
        }
        let entry = RawEntry::new(answer as *const c_void).unwrap();
        let f: unsafe extern "C" fn() -> i32 = unsafe { entry.cast() };
        assert_eq!(unsafe { f() }, 42);
    }
}
