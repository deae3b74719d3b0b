//! gRPC-Web message framing.
//!
//! A gRPC-Web body consists of frames of one flag byte, a four byte big-endian length and the
//! payload. The first frame carries the message; a response may be followed by a trailer frame
//! (flag `0x80`) holding HTTP/1 style `name: value` lines. In the `grpc-web-text` variant the
//! whole body is base64 encoded, possibly as several independently padded chunks.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::{BufMut, Bytes, BytesMut};
use snafu::{ResultExt, Snafu};
use std::convert::TryFrom;
use tracing::{debug, warn};

/// Length of the frame header.
pub const HEADER_LEN: usize = 5;

const FLAG_COMPRESSED: u8 = 0x01;
const FLAG_TRAILERS: u8 = 0x80;

/// Error decoding a gRPC-Web frame.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum FrameError
{
    /// The body was expected to be base64 but isn't.
    #[snafu(display("invalid base64 body: {}", source))]
    MalformedInput
    {
        source: base64::DecodeError
    },

    /// The body is shorter than a frame header.
    #[snafu(display("frame header needs {} bytes, got {}", HEADER_LEN, actual))]
    TruncatedHeader
    {
        actual: usize
    },

    /// The message is compressed.
    #[snafu(display("compressed frames are not supported (flags {:#04x})", flags))]
    CompressedFrame
    {
        flags: u8
    },

    /// The body holds trailers but no message.
    #[snafu(display("body holds only a trailer frame of {} bytes", declared))]
    TrailersOnly
    {
        declared: u32
    },

    /// The declared payload length does not match the body.
    #[snafu(display(
        "frame declares {} payload bytes but {} bytes follow the header",
        declared,
        actual
    ))]
    FrameLengthMismatch
    {
        declared: u32, actual: usize
    },
}

/// Message frame and the trailers following it.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DecodedFrame
{
    /// Payload of the message frame.
    pub payload: Bytes,

    /// Trailers in the order they appear, names lowercased.
    pub trailers: Vec<(String, String)>,
}

/// Strips the frame header from a gRPC-Web body and returns the message payload.
///
/// An empty body yields an empty payload.
pub fn decode_frame(raw: &[u8], is_base64: bool) -> Result<Bytes, FrameError>
{
    decode_frames(raw, is_base64).map(|frame| frame.payload)
}

/// Decodes the message frame of a gRPC-Web body and an optional trailer frame after it.
pub fn decode_frames(raw: &[u8], is_base64: bool) -> Result<DecodedFrame, FrameError>
{
    let data = match is_base64 {
        true => decode_base64(raw).context(MalformedInput {})?,
        false => raw.to_vec(),
    };

    if data.is_empty() {
        return Ok(DecodedFrame::default());
    }

    let (flags, declared, rest) = read_header(&data)?;
    if flags & FLAG_TRAILERS != 0 {
        return Err(FrameError::TrailersOnly { declared });
    }
    if flags & FLAG_COMPRESSED != 0 {
        return Err(FrameError::CompressedFrame { flags });
    }

    let mismatch = || FrameError::FrameLengthMismatch {
        declared,
        actual: rest.len(),
    };
    let len = declared as usize;
    if len > rest.len() {
        return Err(mismatch());
    }

    let (payload, tail) = rest.split_at(len);
    debug!(len, trailing = tail.len(), "Decoded gRPC-Web frame");

    let trailers = match tail.is_empty() {
        true => vec![],
        false => match read_header(tail) {
            Ok((flags, trailer_len, block))
                if flags & FLAG_TRAILERS != 0 && trailer_len as usize == block.len() =>
            {
                parse_trailers(block)
            }
            _ => return Err(mismatch()),
        },
    };

    Ok(DecodedFrame {
        payload: Bytes::copy_from_slice(payload),
        trailers,
    })
}

fn read_header(data: &[u8]) -> Result<(u8, u32, &[u8]), FrameError>
{
    if data.len() < HEADER_LEN {
        return Err(FrameError::TruncatedHeader { actual: data.len() });
    }

    let declared = u32::from_be_bytes([data[1], data[2], data[3], data[4]]);
    Ok((data[0], declared, &data[HEADER_LEN..]))
}

/// Decodes base64 ignoring whitespace. Padding may occur between chunks.
fn decode_base64(raw: &[u8]) -> Result<Vec<u8>, base64::DecodeError>
{
    let text: Vec<u8> = raw
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();

    let mut out = Vec::with_capacity(text.len() / 4 * 3);
    let mut rest = &text[..];
    while !rest.is_empty() {
        let end = match rest.iter().position(|b| *b == b'=') {
            Some(pad) => pad + rest[pad..].iter().take_while(|b| **b == b'=').count(),
            None => rest.len(),
        };
        STANDARD.decode_vec(&rest[..end], &mut out)?;
        rest = &rest[end..];
    }

    Ok(out)
}

fn parse_trailers(block: &[u8]) -> Vec<(String, String)>
{
    let text = String::from_utf8_lossy(block);
    let mut trailers = vec![];
    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        match line.split_once(':') {
            Some((name, value)) => {
                trailers.push((name.trim().to_ascii_lowercase(), value.trim().to_string()))
            }
            None => warn!(line, "Ignoring malformed trailer line"),
        }
    }

    debug!(count = trailers.len(), "Decoded gRPC-Web trailers");
    trailers
}

/// Wraps a payload into an uncompressed message frame.
///
/// Will **panic** if the payload does not fit the 32-bit length of the frame header.
pub fn encode_frame(payload: &[u8]) -> Bytes
{
    frame(0, payload)
}

/// Encodes trailers into a trailer frame.
///
/// Will **panic** if the trailers do not fit the 32-bit length of the frame header.
pub fn encode_trailers(trailers: &[(&str, &str)]) -> Bytes
{
    let block: String = trailers
        .iter()
        .map(|(name, value)| format!("{}: {}\r\n", name, value))
        .collect();
    frame(FLAG_TRAILERS, block.as_bytes())
}

fn frame(flags: u8, payload: &[u8]) -> Bytes
{
    let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len());
    buf.put_u8(flags);
    buf.put_u32(frame_len(payload.len()));
    buf.put_slice(payload);
    buf.freeze()
}

fn frame_len(len: usize) -> u32
{
    match u32::try_from(len) {
        Ok(len) => len,
        Err(_) => panic!("frame payload of {} bytes exceeds the header length field", len),
    }
}

#[cfg(test)]
mod test
{
    use super::*;

    #[test]
    fn header_is_stripped()
    {
        let payload = decode_frame(b"\x00\x00\x00\x00\x02\x08\x01", false).unwrap();
        assert_eq!(&payload[..], b"\x08\x01");
    }

    #[test]
    fn empty_body()
    {
        assert!(decode_frame(b"", false).unwrap().is_empty());
        assert!(decode_frame(b"", true).unwrap().is_empty());
    }

    #[test]
    fn header_errors()
    {
        match decode_frame(b"\x00\x00", false) {
            Err(FrameError::TruncatedHeader { actual: 2 }) => {}
            other => panic!("Unexpected result: {:?}", other),
        }
        match decode_frame(b"\x01\x00\x00\x00\x00", false) {
            Err(FrameError::CompressedFrame { flags: 1 }) => {}
            other => panic!("Unexpected result: {:?}", other),
        }
        match decode_frame(b"\x80\x00\x00\x00\x00", false) {
            Err(FrameError::TrailersOnly { declared: 0 }) => {}
            other => panic!("Unexpected result: {:?}", other),
        }
    }

    #[test]
    fn length_mismatch()
    {
        match decode_frame(b"\x00\x00\x00\x00\x05\x08\x01", false) {
            Err(FrameError::FrameLengthMismatch {
                declared: 5,
                actual: 2,
            }) => {}
            other => panic!("Unexpected result: {:?}", other),
        }

        // Trailing bytes that are not a trailer frame.
        match decode_frame(b"\x00\x00\x00\x00\x01\x08\x01", false) {
            Err(FrameError::FrameLengthMismatch {
                declared: 1,
                actual: 2,
            }) => {}
            other => panic!("Unexpected result: {:?}", other),
        }
    }

    #[test]
    fn trailers()
    {
        let mut body = encode_frame(b"\x08\x01").to_vec();
        body.extend_from_slice(&encode_trailers(&[("grpc-status", "0"), ("Grpc-Message", "OK")]));

        let decoded = decode_frames(&body, false).unwrap();
        assert_eq!(&decoded.payload[..], b"\x08\x01");
        assert_eq!(
            decoded.trailers,
            vec![
                ("grpc-status".to_string(), "0".to_string()),
                ("grpc-message".to_string(), "OK".to_string()),
            ]
        );
    }

    #[test]
    fn base64_chunks()
    {
        let frame = encode_frame(b"\x08\x01");
        let trailers = encode_trailers(&[("grpc-status", "0")]);
        let text = format!(
            "{}\n{}",
            STANDARD.encode(&frame),
            STANDARD.encode(&trailers)
        );

        let decoded = decode_frames(text.as_bytes(), true).unwrap();
        assert_eq!(&decoded.payload[..], b"\x08\x01");
        assert_eq!(decoded.trailers.len(), 1);

        match decode_frame(b"not base64!", true) {
            Err(FrameError::MalformedInput { .. }) => {}
            other => panic!("Unexpected result: {:?}", other),
        }
    }

    #[test]
    fn frame_lengths()
    {
        assert_eq!(frame_len(0), 0);
        assert_eq!(frame_len(u32::MAX as usize), u32::MAX);
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    #[should_panic(expected = "exceeds the header length field")]
    fn oversized_frame()
    {
        frame_len(u32::MAX as usize + 1);
    }
}
