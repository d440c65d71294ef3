//! Property tests for the backend Query/Init contract, run against the
//! pseudo backend through a session.

mod common;

use common::*;
use mxdispatch::abi::{VideoParam, codec, rate_control};
use mxdispatch::session::{InitParams, Session};
use mxdispatch::version::ApiVersion;
use proptest::prelude::*;

fn encoder_params() -> impl Strategy<Value = VideoParam> {
    (
        prop::sample::select(vec![codec::AVC, codec::HEVC, codec::JPEG, codec::AV1]),
        16u16..=8192,
        16u16..=4400,
        prop::sample::select(vec![0, rate_control::CBR, rate_control::VBR, rate_control::CQP]),
        0u16..=20,
        0u16..=8,
        0u16..=70,
    )
        .prop_map(|(codec, width, height, rc, ref_dist, usage, qp)| {
            let mut par = avc(width, height);
            par.codec_id = codec;
            par.rate_control_method = rc;
            par.gop_ref_dist = ref_dist;
            par.target_usage = usage;
            par.qpi = qp;
            par
        })
}

fn open() -> Session {
    Session::open(&pseudo_context(), InitParams::new(ApiVersion::new(2, 0))).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// Whatever Query accepts, Init accepts unchanged.
    #[test]
    fn prop_query_then_init(input in encoder_params()) {
        let mut session = open();
        let mut corrected = VideoParam::default();
        let queried = session.encode_query(Some(&input), &mut corrected);

        if queried.is_ok() {
            prop_assert!(session.encode_init(&corrected).is_ok());
            let mut active = VideoParam::default();
            session.encode_get_video_param(&mut active).unwrap();
            prop_assert_eq!(active, corrected);
        } else {
            prop_assert_eq!(corrected, input, "rejected input is echoed back");
            prop_assert!(session.encode_init(&input).is_err());
        }
        session.close().unwrap();
    }

    /// Query is a fixed point on its own output.
    #[test]
    fn prop_query_is_idempotent(input in encoder_params()) {
        let session = open();
        let mut once = VideoParam::default();
        prop_assume!(session.encode_query(Some(&input), &mut once).is_ok());

        let mut twice = VideoParam::default();
        prop_assert!(session.encode_query(Some(&once), &mut twice).is_ok());
        prop_assert_eq!(once, twice);
    }

    /// Query leaves no state behind in the session.
    #[test]
    fn prop_query_is_pure(input in encoder_params()) {
        let session = open();
        let mut out = VideoParam::default();
        let _ = session.encode_query(Some(&input), &mut out);
        let mut active = VideoParam::default();
        prop_assert!(session.encode_get_video_param(&mut active).is_err());
    }
}
