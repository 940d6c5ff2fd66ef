//! Tests for outbound fragmentation.

use std::num::NonZeroUsize;

use rstest::rstest;

use crate::{
    fragment::Fragmenter,
    frame::{Frame, OpCode},
    message::Message,
};

fn fragmenter(size: usize) -> Fragmenter {
    Fragmenter::new(NonZeroUsize::new(size).expect("non-zero frame size"))
}

fn assert_frame(frames: &[Frame], index: usize, opcode: OpCode, fin: bool, payload: &[u8]) {
    let frame = frames.get(index).expect("frame missing at requested index");
    assert_eq!(frame.opcode, opcode);
    assert_eq!(frame.fin, fin);
    assert_eq!(&frame.payload[..], payload);
}

#[test]
fn message_of_exactly_frame_size_is_one_frame() {
    let frames = fragmenter(4).fragment(&Message::text("abcd"));
    assert_eq!(frames.len(), 1);
    assert_frame(&frames, 0, OpCode::Text, true, b"abcd");
}

#[test]
fn one_byte_over_frame_size_splits() {
    let frames = fragmenter(4).fragment(&Message::text("abcde"));
    assert_eq!(frames.len(), 2);
    assert_frame(&frames, 0, OpCode::Text, false, b"abcd");
    assert_frame(&frames, 1, OpCode::Continuation, true, b"e");
}

#[test]
fn middle_frames_are_non_final_continuations() {
    let frames = fragmenter(2).fragment(&Message::binary(vec![1, 2, 3, 4, 5, 6, 7]));
    assert_eq!(frames.len(), 4);
    assert_frame(&frames, 0, OpCode::Binary, false, &[1, 2]);
    assert_frame(&frames, 1, OpCode::Continuation, false, &[3, 4]);
    assert_frame(&frames, 2, OpCode::Continuation, false, &[5, 6]);
    assert_frame(&frames, 3, OpCode::Continuation, true, &[7]);
}

#[test]
fn empty_message_is_single_final_frame() {
    let frames = fragmenter(1).fragment(&Message::text(""));
    assert_eq!(frames.len(), 1);
    assert_frame(&frames, 0, OpCode::Text, true, b"");
}

#[rstest]
#[case::ping(Message::ping(vec![7u8; 100]), OpCode::Ping)]
#[case::pong(Message::pong(vec![7u8; 100]), OpCode::Pong)]
#[case::close(Message::close(1000, "a fairly long reason"), OpCode::Close)]
fn control_messages_are_never_split(#[case] message: Message, #[case] opcode: OpCode) {
    let frames = fragmenter(3).fragment(&message);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].opcode, opcode);
    assert!(frames[0].fin);
    assert_eq!(frames[0].payload, message.wire_payload());
}
