//! Unit tests for the RFC 6455 frame codec.

use bytes::Bytes;
use proptest::prelude::*;
use rstest::rstest;

use super::{
    CodecError,
    DecodeOptions,
    FrameViolation,
    decode_slice,
    encode,
    encode_with_key,
    header_len,
};
use crate::frame::{Frame, OpCode};

fn server_opts() -> DecodeOptions {
    DecodeOptions {
        mask_required: true,
        ..DecodeOptions::default()
    }
}

#[rstest]
#[case::empty(0, 2)]
#[case::max_short(125, 2)]
#[case::min_16(126, 4)]
#[case::max_16(65_535, 4)]
#[case::min_64(65_536, 10)]
fn length_field_width_follows_payload_size(#[case] len: usize, #[case] header: usize) {
    let frame = Frame::final_frame(OpCode::Binary, vec![0x5A; len]);
    let bytes = encode(&frame, false);

    assert_eq!(header_len(len, false), header);
    assert_eq!(bytes.len(), header + len);
    let decoded = decode_slice(&bytes, DecodeOptions::default()).expect("decode frame");
    assert_eq!(decoded.payload.len(), len);
    assert_eq!(decoded, frame);
}

#[test]
fn extended_length_is_big_endian() {
    let frame = Frame::final_frame(OpCode::Binary, vec![0; 0x1234]);
    let bytes = encode(&frame, false);
    assert_eq!(&bytes[..4], &[0x82, 126, 0x12, 0x34]);
}

#[test]
fn masked_frame_carries_key_and_xored_payload() {
    let frame = Frame::final_frame(OpCode::Text, "abcde");
    let bytes = encode_with_key(&frame, Some([1, 2, 3, 4]));

    assert_eq!(bytes[1], 0x80 | 5);
    assert_eq!(&bytes[2..6], &[1, 2, 3, 4]);
    assert_eq!(
        &bytes[6..],
        &[b'a' ^ 1, b'b' ^ 2, b'c' ^ 3, b'd' ^ 4, b'e' ^ 1]
    );

    let decoded = decode_slice(&bytes, server_opts()).expect("decode masked");
    assert!(decoded.masked);
    assert_eq!(decoded.payload, Bytes::from_static(b"abcde"));
}

#[test]
fn continuation_header_clears_fin() {
    let frame = Frame::new(false, OpCode::Continuation, "x");
    let bytes = encode(&frame, false);
    assert_eq!(bytes[0], 0x00);
}

#[test]
fn reserved_opcode_consumes_frame_then_reports() {
    let mut bytes = vec![0x8C, 0x01, b'z'];
    bytes.extend_from_slice(&encode(&Frame::final_frame(OpCode::Text, "ok"), false));
    let mut reader = &bytes[..];

    let err = super::decode(&mut reader, DecodeOptions::default()).expect_err("reserved opcode");
    assert!(matches!(err, CodecError::BadOpcode(0xC)));

    let next = super::decode(&mut reader, DecodeOptions::default()).expect("stream stays aligned");
    assert_eq!(next.payload, Bytes::from_static(b"ok"));
}

#[rstest]
#[case::rsv(&[0xC1, 0x00], FrameViolation::ReservedBits)]
#[case::fragmented_ping(&[0x09, 0x00], FrameViolation::FragmentedControl)]
#[case::large_close(&[0x88, 126, 0x00, 0x7E], FrameViolation::OversizedControl { len: 126 })]
#[case::msb_length(&[0x82, 127, 0x80, 0, 0, 0, 0, 0, 0, 0], FrameViolation::InvalidLength)]
fn framing_violations_are_reported(#[case] bytes: &[u8], #[case] expected: FrameViolation) {
    let err = decode_slice(bytes, DecodeOptions::default()).expect_err("violation");
    assert!(matches!(err, CodecError::Violation(v) if v == expected));
}

#[test]
fn unmasked_frame_rejected_when_mask_required() {
    let bytes = encode(&Frame::final_frame(OpCode::Text, "hi"), false);
    let err = decode_slice(&bytes, server_opts()).expect_err("mask required");
    assert!(matches!(
        err,
        CodecError::Violation(FrameViolation::MissingMask)
    ));
}

#[test]
fn oversized_payload_rejected_before_allocation() {
    let bytes = [0x82, 127, 0, 0, 0, 1, 0, 0, 0, 0];
    let opts = DecodeOptions {
        max_payload: 1024,
        ..DecodeOptions::default()
    };
    let err = decode_slice(&bytes, opts).expect_err("too large");
    assert!(matches!(
        err,
        CodecError::Violation(FrameViolation::PayloadTooLarge { max: 1024, .. })
    ));
}

#[test]
fn truncated_frame_is_an_io_error() {
    let bytes = encode(&Frame::final_frame(OpCode::Binary, vec![1; 10]), false);
    let err = decode_slice(&bytes[..6], DecodeOptions::default()).expect_err("truncated");
    assert!(matches!(err, CodecError::Io(e) if e.kind() == std::io::ErrorKind::UnexpectedEof));
}

proptest! {
    #[test]
    fn encode_decode_preserves_frames(
        payload in proptest::collection::vec(any::<u8>(), 0..70_000),
        fin in any::<bool>(),
        masked in any::<bool>(),
    ) {
        let frame = Frame::new(fin, OpCode::Binary, payload);
        let bytes = encode(&frame, masked);
        let decoded = decode_slice(&bytes, DecodeOptions::default()).expect("decode");
        prop_assert_eq!(decoded.fin, fin);
        prop_assert_eq!(decoded.masked, masked);
        prop_assert_eq!(decoded.payload, frame.payload);
    }
}
