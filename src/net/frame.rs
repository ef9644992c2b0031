/* This file is part of nzcore.
 *
 * Copyright (C) 2024-2026 NewZone Project Contributors
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as
 * published by the Free Software Foundation, either version 3 of the
 * License, or (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

//! Fixed 10-byte framing: `MAGIC(4) | length:u32 BE | type:u8 | flags:u8
//! | payload`. `FrameParser` is a streaming decoder: `feed` appends raw
//! bytes to an internal buffer and greedily emits every complete frame
//! it can find, leaving a trailing partial frame buffered for the next
//! call. Structural errors reset the parser; the caller owns closing
//! the connection.

pub const MAGIC: u32 = 0x4E5A_434F;
pub const HEADER_LEN: usize = 10;
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageType {
    Data = 1,
    Control = 2,
    Ping = 3,
    Pong = 4,
    Handshake = 5,
    Ack = 6,
    Error = 7,
    Disconnect = 8,
    Fragmented = 9,
    Compressed = 10,
}

impl MessageType {
    pub fn from_u8(b: u8) -> Option<Self> {
        Some(match b {
            1 => Self::Data,
            2 => Self::Control,
            3 => Self::Ping,
            4 => Self::Pong,
            5 => Self::Handshake,
            6 => Self::Ack,
            7 => Self::Error,
            8 => Self::Disconnect,
            9 => Self::Fragmented,
            10 => Self::Compressed,
            _ => return None,
        })
    }
}

/// Bitfield: `COMPRESSED|ENCRYPTED|PRIORITY|REQUEST_ACK|LAST_FRAGMENT|FIRST_FRAGMENT`.
pub mod flags {
    pub const COMPRESSED: u8 = 0x01;
    pub const ENCRYPTED: u8 = 0x02;
    pub const PRIORITY: u8 = 0x04;
    pub const REQUEST_ACK: u8 = 0x08;
    pub const LAST_FRAGMENT: u8 = 0x10;
    pub const FIRST_FRAGMENT: u8 = 0x20;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub msg_type: MessageType,
    pub flags: u8,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(msg_type: MessageType, flags: u8, payload: Vec<u8>) -> Self {
        Self { msg_type, flags, payload }
    }

    /// Serialize to the on-wire form: `MAGIC | length | type | flags | payload`.
    pub fn to_buffer(&self) -> Vec<u8> {
        let length = 6 + self.payload.len();
        let mut out = Vec::with_capacity(4 + 4 + 2 + self.payload.len());
        out.extend_from_slice(&MAGIC.to_be_bytes());
        out.extend_from_slice(&(length as u32).to_be_bytes());
        out.push(self.msg_type as u8);
        out.push(self.flags);
        out.extend_from_slice(&self.payload);
        out
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FrameError {
    InvalidMagic,
    FrameTooLarge,
    InvalidType,
    Corrupted,
}

impl FrameError {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidMagic => "invalid_magic",
            Self::FrameTooLarge => "frame_too_large",
            Self::InvalidType => "invalid_type",
            Self::Corrupted => "corrupted",
        }
    }
}

/// Streaming frame decoder over an internal buffer. On any structural
/// error, `feed` returns the error and the parser resets its buffer;
/// the connection owning this parser MUST close with reason
/// `frame_error`. Partial frames are never discarded.
pub struct FrameParser {
    buf: Vec<u8>,
    max_frame_size: usize,
}

impl FrameParser {
    pub fn new(max_frame_size: usize) -> Self {
        Self { buf: Vec::new(), max_frame_size: max_frame_size.min(DEFAULT_MAX_FRAME_SIZE) }
    }

    /// Append `bytes` and greedily decode every complete frame found.
    /// Returns the frames decoded so far and, if a structural error was
    /// hit, the error that terminated decoding (the buffer has already
    /// been reset in that case).
    pub fn feed(&mut self, bytes: &[u8]) -> (Vec<Frame>, Option<FrameError>) {
        self.buf.extend_from_slice(bytes);
        let mut frames = Vec::new();

        loop {
            if self.buf.len() < 4 {
                return (frames, None)
            }
            let magic = u32::from_be_bytes(self.buf[0..4].try_into().unwrap());
            if magic != MAGIC {
                self.buf.clear();
                return (frames, Some(FrameError::InvalidMagic))
            }

            if self.buf.len() < HEADER_LEN {
                return (frames, None)
            }
            let length = u32::from_be_bytes(self.buf[4..8].try_into().unwrap()) as usize;
            if length < 6 {
                self.buf.clear();
                return (frames, Some(FrameError::Corrupted))
            }
            let payload_len = length - 6;
            let total_len = 4 + length;
            if total_len - 4 > self.max_frame_size {
                self.buf.clear();
                return (frames, Some(FrameError::FrameTooLarge))
            }

            if self.buf.len() < total_len {
                return (frames, None)
            }

            let type_byte = self.buf[8];
            let msg_type = match MessageType::from_u8(type_byte) {
                Some(t) => t,
                None => {
                    self.buf.clear();
                    return (frames, Some(FrameError::InvalidType))
                }
            };
            let frame_flags = self.buf[9];
            let payload = self.buf[HEADER_LEN..total_len].to_vec();
            debug_assert_eq!(payload.len(), payload_len);

            frames.push(Frame::new(msg_type, frame_flags, payload));
            self.buf.drain(0..total_len);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_frame_hello_matches_wire_vector() {
        let frame = Frame::new(MessageType::Data, 0, b"hello".to_vec());
        let bytes = frame.to_buffer();
        assert_eq!(bytes, vec![0x4E, 0x5A, 0x43, 0x4F, 0x00, 0x00, 0x00, 0x0B, 0x01, 0x00, b'h', b'e', b'l', b'l', b'o']);
    }

    #[test]
    fn parser_decodes_single_frame() {
        let frame = Frame::new(MessageType::Data, 0, b"hello".to_vec());
        let mut parser = FrameParser::new(DEFAULT_MAX_FRAME_SIZE);
        let (frames, err) = parser.feed(&frame.to_buffer());
        assert!(err.is_none());
        assert_eq!(frames, vec![frame]);
    }

    #[test]
    fn parser_handles_arbitrary_chunking() {
        let frame = Frame::new(MessageType::Ping, flags::PRIORITY, b"ping-payload".to_vec());
        let bytes = frame.to_buffer();
        let mut parser = FrameParser::new(DEFAULT_MAX_FRAME_SIZE);
        let mut collected = Vec::new();
        for chunk in bytes.chunks(3) {
            let (frames, err) = parser.feed(chunk);
            assert!(err.is_none());
            collected.extend(frames);
        }
        assert_eq!(collected, vec![frame]);
    }

    #[test]
    fn parser_decodes_multiple_frames_in_one_feed() {
        let f1 = Frame::new(MessageType::Data, 0, b"a".to_vec());
        let f2 = Frame::new(MessageType::Data, 0, b"b".to_vec());
        let mut combined = f1.to_buffer();
        combined.extend(f2.to_buffer());

        let mut parser = FrameParser::new(DEFAULT_MAX_FRAME_SIZE);
        let (frames, err) = parser.feed(&combined);
        assert!(err.is_none());
        assert_eq!(frames, vec![f1, f2]);
    }

    #[test]
    fn invalid_magic_resets_parser_and_surfaces_error() {
        let mut parser = FrameParser::new(DEFAULT_MAX_FRAME_SIZE);
        let (frames, err) = parser.feed(&[0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        assert!(frames.is_empty());
        assert_eq!(err, Some(FrameError::InvalidMagic));
    }

    #[test]
    fn invalid_type_is_rejected() {
        let mut bytes = Frame::new(MessageType::Data, 0, b"x".to_vec()).to_buffer();
        bytes[8] = 255;
        let mut parser = FrameParser::new(DEFAULT_MAX_FRAME_SIZE);
        let (_frames, err) = parser.feed(&bytes);
        assert_eq!(err, Some(FrameError::InvalidType));
    }

    #[test]
    fn frame_too_large_is_rejected() {
        let mut parser = FrameParser::new(16);
        let frame = Frame::new(MessageType::Data, 0, vec![0u8; 32]);
        let (_frames, err) = parser.feed(&frame.to_buffer());
        assert_eq!(err, Some(FrameError::FrameTooLarge));
    }

    #[test]
    fn partial_frame_stays_buffered() {
        let frame = Frame::new(MessageType::Data, 0, b"hello".to_vec());
        let bytes = frame.to_buffer();
        let mut parser = FrameParser::new(DEFAULT_MAX_FRAME_SIZE);
        let (frames, err) = parser.feed(&bytes[..5]);
        assert!(frames.is_empty());
        assert!(err.is_none());
        let (frames, err) = parser.feed(&bytes[5..]);
        assert!(err.is_none());
        assert_eq!(frames, vec![frame]);
    }
}
