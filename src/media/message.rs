//! Application-level media messages
//!
//! An `AvMessage` is one RTMP audio, video or data message as delivered by the
//! protocol layer of a publisher or relay puller. The payload is the FLV tag
//! body (codec header bytes included), so classification only needs to look
//! at the first two bytes.

use bytes::Bytes;

use super::flv::{sound_format, VideoCodec, VideoFrameType, SOUND_FORMAT_AAC};

/// RTMP message type id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Audio data (type id 8)
    Audio,
    /// Video data (type id 9)
    Video,
    /// AMF0 data message, e.g. `@setDataFrame` / `onMetaData` (type id 18)
    Metadata,
}

impl MessageType {
    /// RTMP message type id on the wire
    pub fn type_id(&self) -> u8 {
        match self {
            MessageType::Audio => 8,
            MessageType::Video => 9,
            MessageType::Metadata => 18,
        }
    }

    /// Parse a wire type id
    pub fn from_type_id(id: u8) -> Option<Self> {
        match id {
            8 => Some(MessageType::Audio),
            9 => Some(MessageType::Video),
            18 => Some(MessageType::Metadata),
            _ => None,
        }
    }
}

/// Message header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AvHeader {
    /// Message type
    pub msg_type: MessageType,
    /// Timestamp in milliseconds
    pub timestamp: u32,
    /// Message stream id the publisher used
    pub stream_id: u32,
}

/// A media message flowing from the inbound source through the group
///
/// Cloning is cheap: the payload is reference counted and immutable, so the
/// group can retain it without copying while the delivering task moves on to
/// its next read buffer.
#[derive(Debug, Clone)]
pub struct AvMessage {
    pub header: AvHeader,
    pub payload: Bytes,
}

impl AvMessage {
    /// Create a message
    pub fn new(msg_type: MessageType, timestamp: u32, payload: Bytes) -> Self {
        Self {
            header: AvHeader {
                msg_type,
                timestamp,
                stream_id: 1,
            },
            payload,
        }
    }

    /// Create an audio message
    pub fn audio(timestamp: u32, payload: Bytes) -> Self {
        Self::new(MessageType::Audio, timestamp, payload)
    }

    /// Create a video message
    pub fn video(timestamp: u32, payload: Bytes) -> Self {
        Self::new(MessageType::Video, timestamp, payload)
    }

    /// Create a metadata message
    pub fn metadata(timestamp: u32, payload: Bytes) -> Self {
        Self::new(MessageType::Metadata, timestamp, payload)
    }

    /// Message type
    pub fn msg_type(&self) -> MessageType {
        self.header.msg_type
    }

    /// Timestamp in milliseconds
    pub fn timestamp(&self) -> u32 {
        self.header.timestamp
    }

    /// Payload length in bytes
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Check if the payload is empty
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Check if this is an AAC sequence header (AudioSpecificConfig)
    pub fn is_aac_seq_header(&self) -> bool {
        self.header.msg_type == MessageType::Audio
            && self.payload.len() >= 2
            && sound_format(self.payload[0]) == SOUND_FORMAT_AAC
            && self.payload[1] == 0
    }

    /// Check if this is a video sequence header (AVC or HEVC decoder config)
    pub fn is_video_seq_header(&self) -> bool {
        self.is_video_key_packet(0)
    }

    /// Check if this is a video key frame carrying coded NALUs
    ///
    /// This is what opens a new GOP.
    pub fn is_video_key_nalu(&self) -> bool {
        self.is_video_key_packet(1)
    }

    fn is_video_key_packet(&self, packet_type: u8) -> bool {
        if self.header.msg_type != MessageType::Video || self.payload.len() < 2 {
            return false;
        }

        let b = self.payload[0];
        let keyframe = VideoFrameType::from_byte(b)
            .map(|ft| ft.is_keyframe())
            .unwrap_or(false);
        let codec_ok = matches!(
            VideoCodec::from_byte(b),
            Some(VideoCodec::Avc) | Some(VideoCodec::Hevc)
        );

        keyframe && codec_ok && self.payload[1] == packet_type
    }
}
