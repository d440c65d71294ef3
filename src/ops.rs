//! Operation identifiers and the version compatibility table.
//!
//! Each family is generated from a single table that pairs an identifier
//! with its stable native symbol and the API version that introduced it.
//! Identifiers are positional: new operations go at the end of a family and
//! existing ones are never renumbered or removed.

use crate::version::ApiVersion;
use std::ffi::CStr;
use std::fmt;

/// Operation families, one function table each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    /// Core video operations.
    Video,
    /// Plugin load/unload operations exported by the backend.
    Plugin,
    /// Audio operations.
    Audio,
    /// Entry points exported by a legacy plugin module.
    PluginEntry,
}

impl Family {
    /// Short lowercase name, used in logs and metric labels.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Plugin => "plugin",
            Self::Audio => "audio",
            Self::PluginEntry => "plugin-entry",
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An operation identifier within one family.
pub trait Operation: Copy + Eq + fmt::Debug + Send + Sync + 'static {
    /// The family this identifier belongs to.
    const FAMILY: Family;

    /// Number of identifiers in the family (the table size).
    const COUNT: usize;

    /// Every identifier, in index order.
    fn all() -> &'static [Self];

    /// Position of this identifier in its function table.
    fn index(self) -> usize;

    /// Stable native symbol the backend exports for this operation.
    fn symbol(self) -> &'static CStr;

    /// The API version that introduced this operation.
    fn since(self) -> ApiVersion;

    /// Identifier name, used in logs and metric labels.
    fn name(self) -> &'static str;

    /// Whether the operation exists at the given API version.
    #[inline]
    fn exists_at(self, version: ApiVersion) -> bool {
        version >= self.since()
    }
}

macro_rules! operations {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident in $family:ident {
            $(
                $(#[$vmeta:meta])*
                $variant:ident($symbol:literal, $major:literal, $minor:literal),
            )+
        }
    ) => {
        $(#[$meta])*
        #[repr(u16)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $(
                $(#[$vmeta])*
                $variant,
            )+
        }

        impl $name {
            /// Every identifier, in index order.
            pub const ALL: &'static [Self] = &[$(Self::$variant,)+];
        }

        impl Operation for $name {
            const FAMILY: Family = Family::$family;
            const COUNT: usize = Self::ALL.len();

            #[inline]
            fn all() -> &'static [Self] {
                Self::ALL
            }

            #[inline]
            fn index(self) -> usize {
                self as usize
            }

            fn symbol(self) -> &'static CStr {
                match self {
                    $(Self::$variant => $symbol,)+
                }
            }

            fn since(self) -> ApiVersion {
                match self {
                    $(Self::$variant => ApiVersion::new($major, $minor),)+
                }
            }

            fn name(self) -> &'static str {
                match self {
                    $(Self::$variant => stringify!($variant),)+
                }
            }
        }
    };
}

operations! {
    /// Core video operations.
    pub enum VideoOp in Video {
        /// Create a native session.
        Init(c"mx_init", 1, 0),
        /// Destroy a native session.
        Close(c"mx_close", 1, 0),
        /// Report the implementation kind.
        QueryImpl(c"mx_query_impl", 1, 0),
        /// Report the backend API version.
        QueryVersion(c"mx_query_version", 1, 0),
        /// Join a child session for shared scheduling.
        JoinSession(c"mx_join_session", 1, 1),
        /// Detach a joined session.
        DisjoinSession(c"mx_disjoin_session", 1, 1),
        /// Create a sibling native session.
        CloneSession(c"mx_clone_session", 1, 1),
        /// Set the scheduling priority.
        SetPriority(c"mx_set_priority", 1, 1),
        /// Get the scheduling priority.
        GetPriority(c"mx_get_priority", 1, 1),
        /// Create a native session from extended parameters.
        InitEx(c"mx_init_ex", 1, 14),
        /// Install an external frame allocator.
        CoreSetFrameAllocator(c"mx_core_set_frame_allocator", 1, 0),
        /// Attach a device handle.
        CoreSetHandle(c"mx_core_set_handle", 1, 0),
        /// Read back a device handle.
        CoreGetHandle(c"mx_core_get_handle", 1, 0),
        /// Wait for a synchronization point.
        CoreSyncOperation(c"mx_core_sync_operation", 1, 0),
        /// Validate encoder parameters.
        EncodeQuery(c"mx_encode_query", 1, 0),
        /// Report encoder surface requirements.
        EncodeQueryIoSurf(c"mx_encode_query_io_surf", 1, 0),
        /// Initialize the encoder.
        EncodeInit(c"mx_encode_init", 1, 0),
        /// Reset the encoder.
        EncodeReset(c"mx_encode_reset", 1, 0),
        /// Close the encoder.
        EncodeClose(c"mx_encode_close", 1, 0),
        /// Read the active encoder parameters.
        EncodeGetVideoParam(c"mx_encode_get_video_param", 1, 0),
        /// Submit a frame or drain.
        EncodeFrameAsync(c"mx_encode_frame_async", 1, 0),
        /// Validate decoder parameters.
        DecodeQuery(c"mx_decode_query", 1, 0),
        /// Parse stream headers.
        DecodeHeader(c"mx_decode_header", 1, 0),
        /// Report decoder surface requirements.
        DecodeQueryIoSurf(c"mx_decode_query_io_surf", 1, 0),
        /// Initialize the decoder.
        DecodeInit(c"mx_decode_init", 1, 0),
        /// Reset the decoder.
        DecodeReset(c"mx_decode_reset", 1, 0),
        /// Close the decoder.
        DecodeClose(c"mx_decode_close", 1, 0),
        /// Read the active decoder parameters.
        DecodeGetVideoParam(c"mx_decode_get_video_param", 1, 0),
        /// Read decoder statistics.
        DecodeGetDecodeStat(c"mx_decode_get_decode_stat", 1, 0),
        /// Adjust frame skipping.
        DecodeSetSkipMode(c"mx_decode_set_skip_mode", 1, 0),
        /// Fetch user payloads.
        DecodeGetPayload(c"mx_decode_get_payload", 1, 0),
        /// Decode one frame.
        DecodeFrameAsync(c"mx_decode_frame_async", 1, 0),
        /// Validate VPP parameters.
        VppQuery(c"mx_vpp_query", 1, 0),
        /// Report VPP surface requirements.
        VppQueryIoSurf(c"mx_vpp_query_io_surf", 1, 0),
        /// Initialize VPP.
        VppInit(c"mx_vpp_init", 1, 0),
        /// Reset VPP.
        VppReset(c"mx_vpp_reset", 1, 0),
        /// Close VPP.
        VppClose(c"mx_vpp_close", 1, 0),
        /// Read the active VPP parameters.
        VppGetVideoParam(c"mx_vpp_get_video_param", 1, 0),
        /// Read VPP statistics.
        VppGetVppStat(c"mx_vpp_get_vpp_stat", 1, 0),
        /// Process one frame.
        VppRunFrameAsync(c"mx_vpp_run_frame_async", 1, 0),
        /// Register a user plugin with the native session.
        UserRegister(c"mx_video_user_register", 1, 0),
        /// Unregister a user plugin.
        UserUnregister(c"mx_video_user_unregister", 1, 0),
        /// Describe the platform.
        CoreQueryPlatform(c"mx_core_query_platform", 1, 19),
        /// Read encoder statistics.
        EncodeGetEncodeStat(c"mx_encode_get_encode_stat", 2, 0),
        /// Borrow an encoder input surface.
        MemoryGetSurfaceForEncode(c"mx_memory_get_surface_for_encode", 2, 0),
        /// Borrow a decoder output surface.
        MemoryGetSurfaceForDecode(c"mx_memory_get_surface_for_decode", 2, 0),
        /// Borrow a VPP input surface.
        MemoryGetSurfaceForVpp(c"mx_memory_get_surface_for_vpp", 2, 0),
    }
}

operations! {
    /// Plugin operations exported by backends that manage plugins themselves.
    pub enum PluginOp in Plugin {
        /// Load a video plugin by identifier.
        VideoUserLoad(c"mx_video_user_load", 1, 8),
        /// Load a video plugin from a path.
        VideoUserLoadByPath(c"mx_video_user_load_by_path", 1, 13),
        /// Unload a video plugin.
        VideoUserUnload(c"mx_video_user_unload", 1, 8),
        /// Load an audio plugin by identifier.
        AudioUserLoad(c"mx_audio_user_load", 1, 9),
        /// Unload an audio plugin.
        AudioUserUnload(c"mx_audio_user_unload", 1, 9),
    }
}

operations! {
    /// Audio operations.
    pub enum AudioOp in Audio {
        /// Wait for an audio synchronization point.
        SyncOperation(c"mx_audio_core_sync_operation", 1, 8),
        /// Validate audio encoder parameters.
        EncodeQuery(c"mx_audio_encode_query", 1, 8),
        /// Report audio encoder buffer requirements.
        EncodeQueryIoSize(c"mx_audio_encode_query_io_size", 1, 8),
        /// Initialize the audio encoder.
        EncodeInit(c"mx_audio_encode_init", 1, 8),
        /// Reset the audio encoder.
        EncodeReset(c"mx_audio_encode_reset", 1, 8),
        /// Close the audio encoder.
        EncodeClose(c"mx_audio_encode_close", 1, 8),
        /// Read the active audio encoder parameters.
        EncodeGetAudioParam(c"mx_audio_encode_get_audio_param", 1, 8),
        /// Encode one audio frame.
        EncodeFrameAsync(c"mx_audio_encode_frame_async", 1, 8),
        /// Validate audio decoder parameters.
        DecodeQuery(c"mx_audio_decode_query", 1, 8),
        /// Parse audio stream headers.
        DecodeHeader(c"mx_audio_decode_header", 1, 8),
        /// Initialize the audio decoder.
        DecodeInit(c"mx_audio_decode_init", 1, 8),
        /// Reset the audio decoder.
        DecodeReset(c"mx_audio_decode_reset", 1, 8),
        /// Close the audio decoder.
        DecodeClose(c"mx_audio_decode_close", 1, 8),
        /// Report audio decoder buffer requirements.
        DecodeQueryIoSize(c"mx_audio_decode_query_io_size", 1, 8),
        /// Read the active audio decoder parameters.
        DecodeGetAudioParam(c"mx_audio_decode_get_audio_param", 1, 8),
        /// Decode one audio frame.
        DecodeFrameAsync(c"mx_audio_decode_frame_async", 1, 8),
    }
}

operations! {
    /// Entry points of a legacy plugin module.
    pub enum PluginEntryOp in PluginEntry {
        /// Instantiate the plugin.
        Create(c"mx_plugin_create", 1, 8),
        /// Destroy a plugin instance.
        Release(c"mx_plugin_release", 1, 8),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn check_family<O: Operation>() {
        assert_eq!(O::all().len(), O::COUNT);
        for (i, op) in O::all().iter().enumerate() {
            assert_eq!(op.index(), i, "{op:?} out of position");
            assert!(op.symbol().to_bytes().starts_with(b"mx_"));
            assert!(op.since() >= ApiVersion::MIN);
        }
        let symbols: HashSet<_> = O::all().iter().map(|op| op.symbol()).collect();
        assert_eq!(symbols.len(), O::COUNT, "duplicate symbol in {}", O::FAMILY);
    }

    #[test]
    fn test_families_are_consistent() {
        check_family::<VideoOp>();
        check_family::<PluginOp>();
        check_family::<AudioOp>();
        check_family::<PluginEntryOp>();
    }

    #[test]
    fn test_identifiers_are_pinned() {
        // Positions are part of the ABI; these must never move.
        assert_eq!(VideoOp::Init.index(), 0);
        assert_eq!(VideoOp::InitEx.index(), 9);
        assert_eq!(VideoOp::CoreSyncOperation.index(), 13);
        assert_eq!(VideoOp::EncodeFrameAsync.index(), 20);
        assert_eq!(VideoOp::CoreQueryPlatform.index(), 42);
        assert_eq!(VideoOp::EncodeGetEncodeStat.index(), 43);
        assert_eq!(VideoOp::MemoryGetSurfaceForVpp.index(), 46);
        assert_eq!(VideoOp::COUNT, 47);
        assert_eq!(PluginOp::COUNT, 5);
        assert_eq!(AudioOp::COUNT, 16);
        assert_eq!(AudioOp::DecodeFrameAsync.index(), 15);
    }

    #[test]
    fn test_version_gating() {
        let v11 = ApiVersion::new(1, 1);
        assert!(VideoOp::CloneSession.exists_at(v11));
        assert!(!VideoOp::InitEx.exists_at(v11));
        assert!(!VideoOp::EncodeGetEncodeStat.exists_at(v11));
        assert!(VideoOp::EncodeGetEncodeStat.exists_at(ApiVersion::new(2, 0)));
        assert!(!AudioOp::EncodeInit.exists_at(ApiVersion::new(1, 7)));
    }

    #[test]
    fn test_symbols() {
        assert_eq!(VideoOp::EncodeGetEncodeStat.symbol(), c"mx_encode_get_encode_stat");
        assert_eq!(PluginEntryOp::Create.symbol(), c"mx_plugin_create");
        assert_eq!(VideoOp::DecodeFrameAsync.name(), "DecodeFrameAsync");
    }
}
