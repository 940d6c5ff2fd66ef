//! RFC 6455 frame codec.
//!
//! [`encode`] turns a [`Frame`] into wire bytes and [`decode`] reads exactly
//! one frame from a blocking reader. The layout is:
//!
//! ```text
//! byte 0   FIN | RSV1-3 (0) | OPCODE(4)
//! byte 1   MASK | LEN7
//! +2 / +8  extended big-endian length when LEN7 is 126 / 127
//! +4       masking key when MASK is set
//! ...      payload, XORed with the key when masked
//! ```
//!
//! # Error Handling
//!
//! See [`CodecError`]. A reserved opcode is reported only after the whole
//! frame has been consumed so the caller may keep reading; any other
//! failure leaves the stream mid-frame.

use std::io::{Read, Write};

use bytes::{BufMut, Bytes, BytesMut};

pub mod error;

pub use error::{CodecError, FrameViolation};

use crate::frame::{Frame, MAX_CONTROL_PAYLOAD, OpCode, apply_mask, random_mask_key};

const FIN_BIT: u8 = 0x80;
const RSV_BITS: u8 = 0x70;
const OPCODE_BITS: u8 = 0x0F;
const MASK_BIT: u8 = 0x80;
const LEN7_BITS: u8 = 0x7F;
const LEN16_MARKER: u8 = 126;
const LEN64_MARKER: u8 = 127;

/// Largest payload accepted by [`DecodeOptions::default`] (16 MiB).
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// Limits applied while decoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Reject frames that arrive unmasked.
    pub mask_required: bool,
    /// Reject frames declaring a longer payload.
    pub max_payload: usize,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            mask_required: false,
            max_payload: DEFAULT_MAX_PAYLOAD,
        }
    }
}

/// Size of the header `encode` writes for a payload of `len` bytes.
#[must_use]
pub fn header_len(len: usize, masked: bool) -> usize {
    let extended = match len {
        0..=125 => 0,
        126..=0xFFFF => 2,
        _ => 8,
    };
    2 + extended + if masked { 4 } else { 0 }
}

/// Encode `frame`, masking it with a random key when `masked` is set.
///
/// # Examples
///
/// ```
/// use wsframe::{
///     codec::encode,
///     frame::{Frame, OpCode},
/// };
///
/// let bytes = encode(&Frame::final_frame(OpCode::Text, "hi"), false);
/// assert_eq!(&bytes[..], &[0x81, 0x02, b'h', b'i']);
/// ```
#[must_use]
pub fn encode(frame: &Frame, masked: bool) -> BytesMut {
    encode_with_key(frame, masked.then(random_mask_key))
}

/// Encode `frame`, masking it with `key` when one is given.
#[must_use]
pub fn encode_with_key(frame: &Frame, key: Option<[u8; 4]>) -> BytesMut {
    let len = frame.payload.len();
    let mut dst = BytesMut::with_capacity(header_len(len, key.is_some()) + len);

    let fin = if frame.fin { FIN_BIT } else { 0 };
    dst.put_u8(fin | frame.opcode.as_u8());

    let mask = if key.is_some() { MASK_BIT } else { 0 };
    match len {
        0..=125 => {
            #[expect(clippy::cast_possible_truncation, reason = "matched range fits in 7 bits")]
            dst.put_u8(mask | len as u8);
        }
        126..=0xFFFF => {
            dst.put_u8(mask | LEN16_MARKER);
            #[expect(clippy::cast_possible_truncation, reason = "matched range fits in 16 bits")]
            dst.put_u16(len as u16);
        }
        _ => {
            dst.put_u8(mask | LEN64_MARKER);
            dst.put_u64(len as u64);
        }
    }

    match key {
        Some(key) => {
            dst.put_slice(&key);
            let start = dst.len();
            dst.put_slice(&frame.payload);
            apply_mask(&mut dst[start..], key);
        }
        None => dst.put_slice(&frame.payload),
    }
    dst
}

/// Encode `frame` and write it to `writer` in one call.
///
/// # Errors
///
/// Returns [`CodecError::Io`] when the writer fails.
pub fn write_frame<W: Write + ?Sized>(
    writer: &mut W,
    frame: &Frame,
    masked: bool,
) -> Result<(), CodecError> {
    let bytes = encode(frame, masked);
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}

/// Read exactly one frame from `reader`.
///
/// Reads block until the frame is complete; the caller is expected to only
/// call this once the stream reported readable.
///
/// # Errors
///
/// - [`CodecError::BadOpcode`] for a reserved opcode, after consuming the frame.
/// - [`CodecError::Violation`] when the header breaks a framing rule.
/// - [`CodecError::Io`] when the reader fails or ends early.
pub fn decode<R: Read + ?Sized>(reader: &mut R, opts: DecodeOptions) -> Result<Frame, CodecError> {
    let mut head = [0u8; 2];
    reader.read_exact(&mut head)?;

    if head[0] & RSV_BITS != 0 {
        return Err(FrameViolation::ReservedBits.into());
    }
    let fin = head[0] & FIN_BIT != 0;
    let raw_opcode = head[0] & OPCODE_BITS;
    let opcode = OpCode::from_u8(raw_opcode);
    let masked = head[1] & MASK_BIT != 0;

    let len = match head[1] & LEN7_BITS {
        LEN16_MARKER => {
            let mut buf = [0u8; 2];
            reader.read_exact(&mut buf)?;
            u64::from(u16::from_be_bytes(buf))
        }
        LEN64_MARKER => {
            let mut buf = [0u8; 8];
            reader.read_exact(&mut buf)?;
            let len = u64::from_be_bytes(buf);
            if len >> 63 != 0 {
                return Err(FrameViolation::InvalidLength.into());
            }
            len
        }
        short => u64::from(short),
    };

    if let Some(op) = opcode
        && op.is_control()
    {
        if !fin {
            return Err(FrameViolation::FragmentedControl.into());
        }
        if len > MAX_CONTROL_PAYLOAD as u64 {
            return Err(FrameViolation::OversizedControl { len }.into());
        }
    }
    if opts.mask_required && !masked {
        return Err(FrameViolation::MissingMask.into());
    }
    let len = usize::try_from(len)
        .ok()
        .filter(|len| *len <= opts.max_payload)
        .ok_or(FrameViolation::PayloadTooLarge {
            len,
            max: opts.max_payload,
        })?;

    let key = if masked {
        let mut key = [0u8; 4];
        reader.read_exact(&mut key)?;
        Some(key)
    } else {
        None
    };

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;
    if let Some(key) = key {
        apply_mask(&mut payload, key);
    }

    let opcode = opcode.ok_or(CodecError::BadOpcode(raw_opcode))?;
    Ok(Frame {
        fin,
        opcode,
        masked,
        payload: Bytes::from(payload),
    })
}

/// Convenience wrapper decoding from an in-memory buffer.
///
/// # Errors
///
/// As for [`decode`]; a short buffer yields an `UnexpectedEof` I/O error.
pub fn decode_slice(mut bytes: &[u8], opts: DecodeOptions) -> Result<Frame, CodecError> {
    decode(&mut bytes, opts)
}

#[cfg(test)]
mod tests;
