// HDLC-like framing as used by PPP:
// http://www.acacia-net.com/wwwcla/protocol/ip_ppp.htm

use crc::{Crc, CRC_16_IBM_SDLC};
use log::trace;
use std::mem;

use crate::codec::Codec;
use crate::error::FormatError;

// The PPP start sequence.
pub const FLAG: u8 = 0x7e;
pub const CONTROL_ESCAPE: u8 = 0x7d;
const ESCAPE_XOR: u8 = 0x20;

/// Largest payload `HdlcCodec::new` accepts, the PPP default MRU.
pub const DEFAULT_MAX_PAYLOAD: usize = 1500;

const FCS_LEN: usize = 2;

// PPP frame check sequence (RFC 1662), a.k.a. CRC-16/X-25.
const FCS: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_SDLC);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FramerState {
    Idle,
    Receiving,
}

/// Finds frame boundaries in a byte stream, one byte at a time.
///
/// Emitted frames keep both delimiters. A frame only opens on a delimiter followed by a
/// non-delimiter, and the closing delimiter of one frame never doubles as the opening
/// delimiter of the next. Bytes seen before the first delimiter are dropped.
///
/// There is no size limit: a frame that never sees its closing delimiter keeps growing.
pub struct Framer {
    delimiter: u8,
    frame: Vec<u8>,
    state: FramerState,
    last_byte: Option<u8>,
}

impl Framer {
    pub fn new(delimiter: u8) -> Self {
        Framer {
            delimiter,
            frame: Vec::<u8>::new(),
            state: FramerState::Idle,
            last_byte: None,
        }
    }

    pub fn find_frame(&mut self, byte: u8) -> Option<Vec<u8>> {
        let delimiter = self.delimiter;
        match self.state {
            FramerState::Idle if self.last_byte == Some(delimiter) && byte != delimiter => {
                trace!("Start of frame");
                self.state = FramerState::Receiving;
                self.frame.clear();
                self.frame.push(delimiter);
                self.frame.push(byte);
            }
            FramerState::Receiving if byte != delimiter => {
                self.frame.push(byte);
            }
            FramerState::Receiving => {
                trace!("End of frame");
                // Frame is complete, ship it out.
                self.frame.push(byte);
                self.state = FramerState::Idle;
                self.last_byte = None;
                return Some(mem::take(&mut self.frame));
            }
            // Back to back flags: nothing between them.
            FramerState::Idle => {}
        }
        self.last_byte = Some(byte);
        None
    }

    /// True while a frame is partially assembled.
    pub fn is_receiving(&self) -> bool {
        self.state == FramerState::Receiving
    }
}

/// Byte stuffing with a CRC-16 frame check sequence, low byte first.
#[derive(Debug, Clone)]
pub struct HdlcCodec {
    max_payload: usize,
}

impl HdlcCodec {
    pub fn new() -> Self {
        Self::with_max_payload(DEFAULT_MAX_PAYLOAD)
    }

    pub fn with_max_payload(max_payload: usize) -> Self {
        HdlcCodec { max_payload }
    }

    pub fn max_payload(&self) -> usize {
        self.max_payload
    }
}

impl Default for HdlcCodec {
    fn default() -> Self {
        Self::new()
    }
}

fn stuff(byte: u8, out: &mut Vec<u8>) {
    if byte == FLAG || byte == CONTROL_ESCAPE {
        out.push(CONTROL_ESCAPE);
        out.push(byte ^ ESCAPE_XOR);
    } else {
        out.push(byte);
    }
}

impl Codec for HdlcCodec {
    const FRAME_DELIMITER: u8 = FLAG;

    fn encode(&self, payload: &[u8]) -> Result<Vec<u8>, FormatError> {
        if payload.is_empty() {
            return Err(FormatError::EmptyPayload);
        }
        if payload.len() > self.max_payload {
            return Err(FormatError::PayloadTooLarge {
                size: payload.len(),
                max: self.max_payload,
            });
        }

        let fcs = FCS.checksum(payload).to_le_bytes();
        let mut frame = Vec::with_capacity(2 * (payload.len() + FCS_LEN) + 2);
        frame.push(FLAG);
        for &byte in payload.iter().chain(fcs.iter()) {
            stuff(byte, &mut frame);
        }
        frame.push(FLAG);
        Ok(frame)
    }

    fn decode(&self, raw: &[u8]) -> Result<Vec<u8>, FormatError> {
        let inner = match raw {
            [FLAG, inner @ .., FLAG] => inner,
            _ => return Err(FormatError::MissingDelimiter),
        };

        let mut body = Vec::with_capacity(inner.len());
        let mut bytes = inner.iter();
        while let Some(&byte) = bytes.next() {
            if byte == CONTROL_ESCAPE {
                // Discard the control escape, keep the byte it protects.
                match bytes.next() {
                    Some(&escaped) => body.push(escaped ^ ESCAPE_XOR),
                    None => return Err(FormatError::DanglingEscape),
                }
            } else {
                body.push(byte);
            }
        }

        if body.len() <= FCS_LEN {
            return Err(FormatError::TooShort { len: body.len() });
        }
        let payload_len = body.len() - FCS_LEN;
        let received = u16::from_le_bytes([body[payload_len], body[payload_len + 1]]);
        let computed = FCS.checksum(&body[..payload_len]);
        if computed != received {
            return Err(FormatError::BadChecksum { computed, received });
        }

        body.truncate(payload_len);
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames_of(bytes: &[u8]) -> Vec<Vec<u8>> {
        let mut framer = Framer::new(FLAG);
        bytes
            .iter()
            .filter_map(|&byte| framer.find_frame(byte))
            .collect()
    }

    #[test]
    fn test_find_frame() {
        let message_1: Vec<u8> = vec![0x01, 0x02, 0x03, 0x05];
        let message_2: Vec<u8> = vec![0x06, 0x07, 0x08, 0x09];
        let message_3: Vec<u8> = vec![0x0a, 0x0b, 0x7d, 0x5e, 0x0d];

        // Leading noise, then frames each with their own opening and closing flag.
        let mut messages = vec![0x55u8, 0x55u8, 0x55u8, 0x55u8];
        for message in [&message_1, &message_2, &message_3] {
            messages.push(FLAG);
            messages.extend_from_slice(message);
            messages.push(FLAG);
        }
        messages.extend_from_slice(&[0xaau8, 0xaau8, 0xaau8]);

        let frames = frames_of(&messages);
        assert_eq!(frames.len(), 3);
        for (frame, message) in frames.iter().zip([&message_1, &message_2, &message_3]) {
            assert_eq!(frame[0], FLAG);
            assert_eq!(&frame[1..frame.len() - 1], message.as_slice());
            assert_eq!(frame[frame.len() - 1], FLAG);
        }
    }

    #[test]
    fn test_single_frame() {
        assert_eq!(
            frames_of(&[FLAG, 0x01, 0x02, FLAG]),
            vec![vec![FLAG, 0x01, 0x02, FLAG]]
        );
    }

    #[test]
    fn test_flag_runs_are_idle() {
        assert!(frames_of(&[FLAG, FLAG]).is_empty());
        assert!(frames_of(&[FLAG; 16]).is_empty());
    }

    #[test]
    fn test_closing_flag_does_not_open_next_frame() {
        // The second frame shares its opening flag with the first frame's closing flag.
        let frames = frames_of(&[FLAG, 0x01, FLAG, 0x02, FLAG]);
        assert_eq!(frames, vec![vec![FLAG, 0x01, FLAG]]);

        // With its own opening flag it is found.
        let frames = frames_of(&[FLAG, 0x01, FLAG, FLAG, 0x02, FLAG]);
        assert_eq!(frames, vec![vec![FLAG, 0x01, FLAG], vec![FLAG, 0x02, FLAG]]);
    }

    #[test]
    fn test_bytes_before_first_flag_are_dropped() {
        let frames = frames_of(&[0x10, 0x11, 0x12, FLAG, 0x13, FLAG]);
        assert_eq!(frames, vec![vec![FLAG, 0x13, FLAG]]);
    }

    #[test]
    fn test_state_survives_chunk_boundaries() {
        let mut framer = Framer::new(FLAG);
        let mut frames = vec![];
        for chunk in [&[0x00, FLAG][..], &[0x21][..], &[0x22, 0x23][..], &[FLAG][..]] {
            assert!(frames.is_empty());
            frames.extend(chunk.iter().filter_map(|&byte| framer.find_frame(byte)));
        }
        assert_eq!(frames, vec![vec![FLAG, 0x21, 0x22, 0x23, FLAG]]);
        assert!(!framer.is_receiving());
    }

    #[test]
    fn test_frames_have_no_interior_flags() {
        let mut stream = vec![];
        for i in 0..200u32 {
            stream.push(if i % 7 == 0 || i % 11 == 0 { FLAG } else { i as u8 });
        }
        for frame in frames_of(&stream) {
            assert!(frame.len() >= 3);
            assert_eq!(frame[0], FLAG);
            assert_eq!(frame[frame.len() - 1], FLAG);
            assert!(!frame[1..frame.len() - 1].contains(&FLAG));
        }
    }

    #[test]
    fn test_encode_decode() {
        let codec = HdlcCodec::new();
        let packets: Vec<Vec<u8>> = vec![
            vec![0x40, 0x41, 0x42, 0x7e, 0x44, 0x45, 0x46, 0x47, 0x48],
            vec![0x7d, 0x7e, 0x7d, 0x7e],
            "Carthāgō dēlenda est\n".into(),
            (0..=255u8).collect(),
        ];
        for packet in packets {
            let frame = codec.encode(&packet).unwrap();
            assert_eq!(frame[0], FLAG);
            assert_eq!(frame[frame.len() - 1], FLAG);
            assert!(!frame[1..frame.len() - 1].contains(&FLAG));
            assert_eq!(codec.decode(&frame).unwrap(), packet);
        }
    }

    #[test]
    fn test_frame_check_sequence() {
        assert_eq!(FCS.checksum(b"123456789"), 0x906e);

        let codec = HdlcCodec::new();
        let frame = codec.encode(b"123456789").unwrap();
        let mut expected = vec![FLAG];
        expected.extend_from_slice(b"123456789");
        expected.extend_from_slice(&[0x6e, 0x90, FLAG]);
        assert_eq!(frame, expected);

        let mut corrupt = frame.clone();
        corrupt[1] = b'0';
        match codec.decode(&corrupt) {
            Err(FormatError::BadChecksum { computed, received }) => {
                assert_eq!(received, 0x906e);
                assert_eq!(computed, FCS.checksum(b"023456789"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_unterminated_frame_keeps_growing() {
        let mut framer = Framer::new(FLAG);
        assert_eq!(framer.find_frame(FLAG), None);
        for _ in 0..10_000 {
            assert_eq!(framer.find_frame(0x00), None);
        }
        assert!(framer.is_receiving());
        let frame = framer.find_frame(FLAG).unwrap();
        assert_eq!(frame.len(), 10_002);
    }

    #[test]
    fn test_encoded_frame_survives_framer() {
        let codec = HdlcCodec::new();
        let packet = vec![0x7e, 0x00, 0x7d, 0x7e];
        let frame = codec.encode(&packet).unwrap();
        let frames = frames_of(&frame);
        assert_eq!(frames, vec![frame]);
        assert_eq!(codec.decode(&frames[0]).unwrap(), packet);
    }

    #[test]
    fn test_encode_rejects() {
        assert_eq!(HdlcCodec::new().max_payload(), DEFAULT_MAX_PAYLOAD);
        assert!(HdlcCodec::new().encode(&[0; DEFAULT_MAX_PAYLOAD]).is_ok());

        let codec = HdlcCodec::with_max_payload(4);
        assert_eq!(codec.max_payload(), 4);
        assert_eq!(codec.encode(&[]), Err(FormatError::EmptyPayload));
        assert_eq!(
            codec.encode(&[0; 5]),
            Err(FormatError::PayloadTooLarge { size: 5, max: 4 })
        );
        assert!(codec.encode(&[0; 4]).is_ok());
    }

    #[test]
    fn test_decode_rejects() {
        let codec = HdlcCodec::new();
        assert_eq!(
            codec.decode(&[0x01, 0x02, FLAG]),
            Err(FormatError::MissingDelimiter)
        );
        assert_eq!(codec.decode(&[FLAG]), Err(FormatError::MissingDelimiter));
        assert_eq!(
            codec.decode(&[FLAG, 0x01, 0x02, FLAG]),
            Err(FormatError::TooShort { len: 2 })
        );
        assert_eq!(
            codec.decode(&[FLAG, 0x01, 0x02, 0x03, CONTROL_ESCAPE, FLAG]),
            Err(FormatError::DanglingEscape)
        );

        let mut frame = codec.encode(&[0x01, 0x02, 0x03]).unwrap();
        frame[1] = 0x04;
        assert!(matches!(
            codec.decode(&frame),
            Err(FormatError::BadChecksum { .. })
        ));
    }
}
