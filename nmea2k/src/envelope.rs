use std::fmt;

use crate::frame::{CAN_MAX_DLEN, CanFrame};
use crate::header::FrameHeader;

/// First byte of every envelope
pub const ENVELOPE_START: u8 = 0x93;

/// Last byte of every envelope, stands in for a CRC that is never checked
pub const ENVELOPE_CRC_PLACEHOLDER: u8 = 0x55;

/// Fixed bytes between the length byte and the payload
pub const ENVELOPE_HEADER_LEN: usize = 11;

const TIMESTAMP_PLACEHOLDER: [u8; 4] = [0xFF; 4];

/// A complete NMEA2000 message in canonical envelope form
///
/// Layout of [`CanonicalMessage::to_bytes`]:
///
/// | byte     | content                                             |
/// |----------|-----------------------------------------------------|
/// | 0        | `0x93`                                              |
/// | 1        | payload length + 11 (fast packet) or 8 (single)     |
/// | 2        | priority                                            |
/// | 3..6     | PGN, little endian                                  |
/// | 6        | destination                                         |
/// | 7        | source                                              |
/// | 8..12    | `0xFF` timestamp placeholder                        |
/// | 12       | payload length                                      |
/// | 13..     | payload                                             |
/// | last     | `0x55` CRC placeholder                              |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalMessage {
    pub pgn: u32,
    pub priority: u8,
    pub source: u8,
    pub destination: u8,
    pub payload: Vec<u8>,
    pub is_fast_packet: bool,
}

impl CanonicalMessage {
    /// Wrap the 8 data bytes of a single-frame message
    pub fn single_frame(header: &FrameHeader, frame: &CanFrame) -> Self {
        Self {
            pgn: header.pgn,
            priority: header.priority,
            source: header.source,
            destination: header.destination,
            payload: frame.data.to_vec(),
            is_fast_packet: false,
        }
    }

    /// Wrap a reassembled fast packet payload
    pub fn fast(header: &FrameHeader, payload: &[u8]) -> Self {
        Self {
            pgn: header.pgn,
            priority: header.priority,
            source: header.source,
            destination: header.destination,
            payload: payload.to_vec(),
            is_fast_packet: true,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        // Length fields are single bytes on the wire
        let length = self.payload.len() as u8;
        let length_field = if self.is_fast_packet {
            length.wrapping_add(ENVELOPE_HEADER_LEN as u8)
        } else {
            CAN_MAX_DLEN as u8
        };

        let mut data = Vec::with_capacity(self.payload.len() + ENVELOPE_HEADER_LEN + 3);
        data.push(ENVELOPE_START);
        data.push(length_field);
        data.push(self.priority);
        data.extend_from_slice(&self.pgn.to_le_bytes()[..3]);
        data.push(self.destination);
        data.push(self.source);
        data.extend_from_slice(&TIMESTAMP_PLACEHOLDER);
        data.push(length);
        data.extend_from_slice(&self.payload);
        data.push(ENVELOPE_CRC_PLACEHOLDER);
        data
    }
}

impl fmt::Display for CanonicalMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "PGN {} src {} dst {} prio {} len {}",
            self.pgn,
            self.source,
            self.destination,
            self.priority,
            self.payload.len()
        )?;
        for byte in &self.payload {
            write!(f, " {:02X}", byte)?;
        }
        Ok(())
    }
}

/// Read the PGN back out of an encoded envelope (bytes 3 to 5)
pub fn pgn_from_envelope(envelope: &[u8]) -> Option<u32> {
    let bytes = envelope.get(3..6)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0]))
}

/// Address a notification is attributed to
///
/// `name` is the first 8 envelope bytes read little endian, so its top byte
/// is the source address of the message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct N2kAddress {
    pub interface: String,
    pub name: u64,
}

impl N2kAddress {
    pub fn from_envelope(interface: &str, envelope: &[u8]) -> Self {
        let mut name = [0u8; 8];
        let count = envelope.len().min(8);
        name[..count].copy_from_slice(&envelope[..count]);
        Self {
            interface: interface.to_string(),
            name: u64::from_le_bytes(name),
        }
    }

    pub fn source(&self) -> u8 {
        (self.name >> 56) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_frame_layout() {
        let header = FrameHeader::from_id(0x09F80103);
        let frame = CanFrame::new(0x09F80103, &[1, 2, 3, 4, 5, 6, 7, 8]);
        let bytes = CanonicalMessage::single_frame(&header, &frame).to_bytes();

        assert_eq!(
            bytes,
            vec![
                0x93, 8, 2, 0x01, 0xF8, 0x01, 0xFF, 0x03, 0xFF, 0xFF, 0xFF, 0xFF, 8, 1, 2, 3, 4,
                5, 6, 7, 8, 0x55
            ]
        );
    }

    #[test]
    fn test_single_frame_uses_padded_data() {
        let header = FrameHeader::from_id(0x09F80103);
        let frame = CanFrame::new(0x09F80103, &[0xAA]);
        let bytes = CanonicalMessage::single_frame(&header, &frame).to_bytes();
        assert_eq!(bytes[12], 8);
        assert_eq!(&bytes[13..21], &[0xAA, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(bytes.len(), 22);
    }

    #[test]
    fn test_fast_layout() {
        let header = FrameHeader::from_id(0x0DF80510);
        let payload: Vec<u8> = (0..20).collect();
        let bytes = CanonicalMessage::fast(&header, &payload).to_bytes();

        assert_eq!(bytes[0], ENVELOPE_START);
        assert_eq!(bytes[1], 31);
        assert_eq!(bytes[2], 3);
        assert_eq!(&bytes[3..6], &[0x05, 0xF8, 0x01]);
        assert_eq!(bytes[6], 0xFF);
        assert_eq!(bytes[7], 0x10);
        assert_eq!(&bytes[8..12], &[0xFF; 4]);
        assert_eq!(bytes[12], 20);
        assert_eq!(&bytes[13..33], payload.as_slice());
        assert_eq!(bytes[33], ENVELOPE_CRC_PLACEHOLDER);
        assert_eq!(bytes.len(), 34);
    }

    #[test]
    fn test_pdu1_destination() {
        let header = FrameHeader::from_id(0x18EA2305);
        let frame = CanFrame::new(0x18EA2305, &[0x00, 0xEE, 0x00]);
        let bytes = CanonicalMessage::single_frame(&header, &frame).to_bytes();
        assert_eq!(&bytes[3..6], &[0x00, 0xEA, 0x00]);
        assert_eq!(bytes[6], 0x23);
        assert_eq!(bytes[7], 0x05);
    }

    #[test]
    fn test_pgn_from_envelope() {
        let header = FrameHeader::from_id(0x0DF80510);
        let bytes = CanonicalMessage::fast(&header, &[1, 2, 3]).to_bytes();
        assert_eq!(pgn_from_envelope(&bytes), Some(129029));
        assert_eq!(pgn_from_envelope(&bytes[..4]), None);
    }

    #[test]
    fn test_address_name_carries_source() {
        let header = FrameHeader::from_id(0x0DF80510);
        let bytes = CanonicalMessage::fast(&header, &[1, 2, 3]).to_bytes();
        let address = N2kAddress::from_envelope("n2k-net", &bytes);
        assert_eq!(address.interface, "n2k-net");
        assert_eq!(address.source(), 0x10);
        assert_eq!(address.name & 0xFF, 0x93);
    }

    #[test]
    fn test_display() {
        let header = FrameHeader::from_id(0x09F80103);
        let message = CanonicalMessage::fast(&header, &[0x0A, 0xFF]);
        assert_eq!(message.to_string(), "PGN 129025 src 3 dst 255 prio 2 len 2 0A FF");
    }
}
