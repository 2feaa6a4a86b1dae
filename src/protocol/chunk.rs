//! RTMP chunk encoding for outbound media
//!
//! Outbound media messages are split into chunks of at most `chunk_size`
//! payload bytes. The first chunk carries a type-0 header; every following
//! chunk carries a type-3 (basic header only) header.
//!
//! ```text
//! type 0: | fmt|csid (1) | timestamp (3) | length (3) | type id (1) | stream id (4, LE) | [ext ts (4)]
//! type 3: | fmt|csid (1) | [ext ts (4)]
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use crate::media::message::{AvHeader, MessageType};

/// Chunk stream id used for data (metadata) messages
pub const CSID_DATA: u8 = 5;

/// Chunk stream id used for audio messages
pub const CSID_AUDIO: u8 = 6;

/// Chunk stream id used for video messages
pub const CSID_VIDEO: u8 = 7;

/// Message stream id used when writing to players and relay targets
pub const DEFAULT_MSG_STREAM_ID: u32 = 1;

/// Chunk size the server announces to its peers
pub const DEFAULT_CHUNK_SIZE: u32 = 4096;

/// Smallest chunk size allowed by the protocol
pub const MIN_CHUNK_SIZE: u32 = 128;

/// Timestamps at or above this value go into the extended timestamp field
const EXTENDED_TIMESTAMP: u32 = 0x00FF_FFFF;

/// Chunk stream id for a message type
pub fn csid_for(msg_type: MessageType) -> u8 {
    match msg_type {
        MessageType::Audio => CSID_AUDIO,
        MessageType::Video => CSID_VIDEO,
        MessageType::Metadata => CSID_DATA,
    }
}

/// Split one message into RTMP chunks
///
/// The outbound header always uses the default chunk stream for the message
/// type and `DEFAULT_MSG_STREAM_ID`, whatever stream id the publisher used.
pub fn encode_message(header: &AvHeader, payload: &[u8], chunk_size: u32) -> Bytes {
    let chunk_size = chunk_size.max(MIN_CHUNK_SIZE) as usize;
    let csid = csid_for(header.msg_type);
    let extended = header.timestamp >= EXTENDED_TIMESTAMP;

    let chunks = payload.len().div_ceil(chunk_size).max(1);
    let ext_len = if extended { 4 } else { 0 };
    let capacity = 12 + ext_len + payload.len() + (chunks - 1) * (1 + ext_len);
    let mut buf = BytesMut::with_capacity(capacity);

    // Type 0
    buf.put_u8(csid & 0x3F);
    let ts_field = if extended {
        EXTENDED_TIMESTAMP
    } else {
        header.timestamp
    };
    put_u24(&mut buf, ts_field);
    put_u24(&mut buf, payload.len() as u32);
    buf.put_u8(header.msg_type.type_id());
    buf.put_u32_le(DEFAULT_MSG_STREAM_ID);
    if extended {
        buf.put_u32(header.timestamp);
    }

    let mut rest = payload;
    let mut first = true;
    loop {
        if !first {
            buf.put_u8(0xC0 | (csid & 0x3F));
            if extended {
                buf.put_u32(header.timestamp);
            }
        }
        first = false;

        let n = rest.len().min(chunk_size);
        buf.put_slice(&rest[..n]);
        rest = &rest[n..];
        if rest.is_empty() {
            break;
        }
    }

    buf.freeze()
}

fn put_u24(buf: &mut BytesMut, v: u32) {
    buf.put_u8((v >> 16) as u8);
    buf.put_u8((v >> 8) as u8);
    buf.put_u8(v as u8);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(msg_type: MessageType, timestamp: u32) -> AvHeader {
        AvHeader {
            msg_type,
            timestamp,
            stream_id: 3,
        }
    }

    #[test]
    fn test_single_chunk() {
        let out = encode_message(&header(MessageType::Audio, 1000), &[0xAF, 0x01, 0x02], 128);

        assert_eq!(out.len(), 12 + 3);
        assert_eq!(out[0], CSID_AUDIO);
        assert_eq!(&out[1..4], &[0x00, 0x03, 0xE8]);
        assert_eq!(&out[4..7], &[0, 0, 3]);
        assert_eq!(out[7], 8);
        // Stream id is rewritten to the default, little endian
        assert_eq!(&out[8..12], &[1, 0, 0, 0]);
        assert_eq!(&out[12..], &[0xAF, 0x01, 0x02]);
    }

    #[test]
    fn test_multiple_chunks() {
        let payload = vec![0x55u8; 300];
        let out = encode_message(&header(MessageType::Video, 40), &payload, 128);

        // 12 byte header + 300 bytes + two type-3 basic headers
        assert_eq!(out.len(), 12 + 300 + 2);
        assert_eq!(out[12 + 128], 0xC0 | CSID_VIDEO);
        assert_eq!(out[12 + 128 + 1 + 128], 0xC0 | CSID_VIDEO);
    }

    #[test]
    fn test_chunk_size_clamped() {
        let payload = vec![0u8; 200];
        let small = encode_message(&header(MessageType::Video, 0), &payload, 1);
        let min = encode_message(&header(MessageType::Video, 0), &payload, MIN_CHUNK_SIZE);
        assert_eq!(small, min);
    }

    #[test]
    fn test_extended_timestamp() {
        let payload = vec![1u8; 130];
        let ts = 0x0100_0000;
        let out = encode_message(&header(MessageType::Metadata, ts), &payload, 128);

        assert_eq!(out[0], CSID_DATA);
        assert_eq!(&out[1..4], &[0xFF, 0xFF, 0xFF]);
        assert_eq!(&out[12..16], &ts.to_be_bytes());
        // type-3 header repeats the extended timestamp
        let cont = 16 + 128;
        assert_eq!(out[cont], 0xC0 | CSID_DATA);
        assert_eq!(&out[cont + 1..cont + 5], &ts.to_be_bytes());
        assert_eq!(out.len(), 16 + 130 + 5);
    }

    #[test]
    fn test_empty_payload() {
        let out = encode_message(&header(MessageType::Metadata, 0), &[], 128);
        assert_eq!(out.len(), 12);
    }
}
