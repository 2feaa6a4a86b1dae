//! FLV tag encoding
//!
//! Progressive HTTP-FLV consumers receive a 13-byte file header once, then a
//! stream of FLV tags. Each RTMP audio/video/data message maps onto exactly one
//! tag: the message payload becomes the tag body.
//!
//! ```text
//! +--------+-------------+-----------+-------------+---------+---------------+
//! | Type(1)| DataSize(3) | TS(3+1)   | StreamID(3) | Data(N) | PrevSize(4)   |
//! +--------+-------------+-----------+-------------+---------+---------------+
//! ```
//!
//! The first byte of the body carries the codec header used for
//! classification:
//!
//! ```text
//! video: | FrameType (4 bits) | CodecID (4 bits) | AVCPacketType | ...
//! audio: | SoundFormat (4 bits) | Rate | Size | Type | AACPacketType | ...
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use super::message::{AvMessage, MessageType};

/// Size of the FLV tag header
pub const TAG_HEADER_SIZE: usize = 11;

/// Size of the trailing previous-tag-size field
pub const PREV_TAG_SIZE_LEN: usize = 4;

/// FLV file header: signature, version 1, audio+video flags, header length 9,
/// followed by PreviousTagSize0
const FILE_HEADER: [u8; 13] = [
    b'F', b'L', b'V', 0x01, 0x05, 0x00, 0x00, 0x00, 0x09, 0x00, 0x00, 0x00, 0x00,
];

/// FLV tag type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlvTagType {
    Audio,
    Video,
    Script,
}

impl FlvTagType {
    /// Tag type byte
    pub fn as_byte(&self) -> u8 {
        match self {
            FlvTagType::Audio => 8,
            FlvTagType::Video => 9,
            FlvTagType::Script => 18,
        }
    }
}

impl From<MessageType> for FlvTagType {
    fn from(t: MessageType) -> Self {
        match t {
            MessageType::Audio => FlvTagType::Audio,
            MessageType::Video => FlvTagType::Video,
            MessageType::Metadata => FlvTagType::Script,
        }
    }
}

/// Video frame type (upper 4 bits of first byte)
///
/// Only the values that matter for GOP boundaries are named.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoFrameType {
    Keyframe = 1,
    InterFrame = 2,
    /// Reserved for server use
    GeneratedKeyframe = 4,
}

impl VideoFrameType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match (b >> 4) & 0x0F {
            1 => Some(VideoFrameType::Keyframe),
            2 => Some(VideoFrameType::InterFrame),
            4 => Some(VideoFrameType::GeneratedKeyframe),
            _ => None,
        }
    }

    pub fn is_keyframe(&self) -> bool {
        matches!(
            self,
            VideoFrameType::Keyframe | VideoFrameType::GeneratedKeyframe
        )
    }
}

/// Video codecs whose packets carry an AVC-style packet type byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    Avc = 7,
    /// Non-standard id used by the common HEVC-over-RTMP extension
    Hevc = 12,
}

impl VideoCodec {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b & 0x0F {
            7 => Some(VideoCodec::Avc),
            12 => Some(VideoCodec::Hevc),
            _ => None,
        }
    }
}

/// SoundFormat value for AAC
pub const SOUND_FORMAT_AAC: u8 = 10;

/// SoundFormat (upper 4 bits of an audio tag's first byte)
pub fn sound_format(b: u8) -> u8 {
    (b >> 4) & 0x0F
}

/// The FLV file header sent once at the start of a progressive download
pub fn file_header() -> Bytes {
    Bytes::from_static(&FILE_HEADER)
}

/// Encode a message as a complete FLV tag, including the trailing
/// previous-tag-size field
pub fn encode_tag(msg: &AvMessage) -> Bytes {
    let body_len = msg.payload.len();
    let mut buf = BytesMut::with_capacity(TAG_HEADER_SIZE + body_len + PREV_TAG_SIZE_LEN);

    let ts = msg.header.timestamp;
    buf.put_u8(FlvTagType::from(msg.header.msg_type).as_byte());
    put_u24(&mut buf, body_len as u32);
    put_u24(&mut buf, ts & 0x00FF_FFFF);
    buf.put_u8((ts >> 24) as u8);
    // StreamID, always 0
    put_u24(&mut buf, 0);
    buf.put_slice(&msg.payload);
    buf.put_u32((TAG_HEADER_SIZE + body_len) as u32);

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

    #[test]
    fn test_video_frame_type() {
        assert_eq!(
            VideoFrameType::from_byte(0x17),
            Some(VideoFrameType::Keyframe)
        );
        assert_eq!(
            VideoFrameType::from_byte(0x27),
            Some(VideoFrameType::InterFrame)
        );
        assert_eq!(VideoFrameType::from_byte(0x07), None);
        assert_eq!(VideoFrameType::from_byte(0x37), None);
        assert!(VideoFrameType::GeneratedKeyframe.is_keyframe());
        assert!(!VideoFrameType::InterFrame.is_keyframe());
    }

    #[test]
    fn test_codec_and_format() {
        assert_eq!(VideoCodec::from_byte(0x17), Some(VideoCodec::Avc));
        assert_eq!(VideoCodec::from_byte(0x1C), Some(VideoCodec::Hevc));
        assert_eq!(VideoCodec::from_byte(0x14), None);
        assert_eq!(sound_format(0xAF), SOUND_FORMAT_AAC);
        assert_ne!(sound_format(0x2F), SOUND_FORMAT_AAC);
    }

    #[test]
    fn test_file_header() {
        let header = file_header();
        assert_eq!(header.len(), 13);
        assert_eq!(&header[..3], b"FLV");
        assert_eq!(header[4], 0x05); // audio + video
    }

    #[test]
    fn test_encode_video_tag() {
        let msg = AvMessage::video(0x0102_0304, Bytes::from_static(&[0x17, 0x01, 0xAA]));
        let tag = encode_tag(&msg);

        assert_eq!(tag.len(), TAG_HEADER_SIZE + 3 + PREV_TAG_SIZE_LEN);
        assert_eq!(tag[0], 9);
        assert_eq!(&tag[1..4], &[0, 0, 3]);
        // Lower 24 bits, then the extended byte
        assert_eq!(&tag[4..7], &[0x02, 0x03, 0x04]);
        assert_eq!(tag[7], 0x01);
        assert_eq!(&tag[8..11], &[0, 0, 0]);
        assert_eq!(&tag[11..14], &[0x17, 0x01, 0xAA]);
        assert_eq!(&tag[14..], &[0, 0, 0, 14]);
    }

    #[test]
    fn test_encode_script_tag() {
        let msg = AvMessage::metadata(0, Bytes::from_static(b"meta"));
        let tag = encode_tag(&msg);
        assert_eq!(tag[0], 18);
        assert_eq!(&tag[11..15], b"meta");
    }
}
