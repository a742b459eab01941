use std::fmt;

use crate::frame::{CAN_EFF_MASK, CanFrame};

/// Destination used by PDU2 (broadcast) messages
pub const BROADCAST_ADDRESS: u8 = 0xFF;

/// PGNs carried as fast packets (payload may exceed 8 bytes)
///
/// Must stay sorted, lookups use binary search.
const FAST_MESSAGE_PGNS: &[u32] = &[
    65240, 126208, 126464, 126720, 126983, 126984, 126985, 126986, 126987, 126988, 126996,
    126998, 127233, 127237, 127489, 127496, 127497, 127498, 127503, 127504, 127506, 127507,
    127509, 127510, 127511, 127512, 127513, 127514, 128275, 128520, 129029, 129038, 129039,
    129040, 129041, 129044, 129045, 129284, 129285, 129301, 129302, 129538, 129540, 129541,
    129542, 129545, 129547, 129549, 129551, 129556, 129792, 129793, 129794, 129795, 129796,
    129797, 129798, 129799, 129800, 129801, 129802, 129803, 129804, 129805, 129806, 129807,
    129808, 129809, 129810, 130052, 130053, 130054, 130060, 130061, 130064, 130065, 130066,
    130067, 130068, 130069, 130070, 130071, 130072, 130073, 130074, 130320, 130321, 130322,
    130323, 130324, 130567, 130577, 130578, 130816,
];

/// Routing fields decoded from a 29-bit extended identifier
///
/// Layout (MSB first): priority (3 bits), PGN (18 bits), source (8 bits).
/// When the PDU format byte is below 240 (PDU1) the low PGN byte is the
/// destination address and is cleared from the PGN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameHeader {
    pub priority: u8,
    pub pgn: u32,
    pub source: u8,
    pub destination: u8,
}

impl FrameHeader {
    pub fn from_id(id: u32) -> Self {
        let id = id & CAN_EFF_MASK;
        let source = (id & 0xFF) as u8;
        let pdu_specific = ((id >> 8) & 0xFF) as u8;
        let pdu_format = ((id >> 16) & 0xFF) as u8;
        let priority = ((id >> 26) & 0x07) as u8;
        let pgn = (id >> 8) & 0x3FFFF;

        if pdu_format < 240 {
            Self {
                priority,
                pgn: pgn & !0xFF,
                source,
                destination: pdu_specific,
            }
        } else {
            Self {
                priority,
                pgn,
                source,
                destination: BROADCAST_ADDRESS,
            }
        }
    }

    pub fn is_pdu1(&self) -> bool {
        ((self.pgn >> 8) & 0xFF) < 240
    }

    pub fn is_fast_message(&self) -> bool {
        is_fast_message_pgn(self.pgn)
    }
}

impl From<&CanFrame> for FrameHeader {
    fn from(frame: &CanFrame) -> Self {
        FrameHeader::from_id(frame.id)
    }
}

impl fmt::Display for FrameHeader {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "PGN {} prio {} src {} dst {}",
            self.pgn, self.priority, self.source, self.destination
        )
    }
}

pub fn is_fast_message_pgn(pgn: u32) -> bool {
    FAST_MESSAGE_PGNS.binary_search(&pgn).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fast_pgn_table_sorted() {
        assert!(FAST_MESSAGE_PGNS.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_decode_pdu2() {
        // Priority 2, PGN 129025 (0x1F801), source 0x03
        let header = FrameHeader::from_id(0x09F80103);
        assert_eq!(header.priority, 2);
        assert_eq!(header.pgn, 129025);
        assert_eq!(header.source, 0x03);
        assert_eq!(header.destination, BROADCAST_ADDRESS);
        assert!(!header.is_pdu1());
    }

    #[test]
    fn test_decode_pdu1_masks_destination() {
        // Priority 6, PGN 59904 (ISO request, PF 0xEA) to 0x23 from 0x05
        let header = FrameHeader::from_id(0x18EA2305);
        assert_eq!(header.priority, 6);
        assert_eq!(header.pgn, 59904);
        assert_eq!(header.destination, 0x23);
        assert_eq!(header.source, 0x05);
        assert!(header.is_pdu1());
    }

    #[test]
    fn test_decode_ignores_bits_above_29() {
        assert_eq!(FrameHeader::from_id(0xE9F80103), FrameHeader::from_id(0x09F80103));
    }

    #[test]
    fn test_decode_data_page_bit() {
        // PGN 0x1F805 = 129029, DP bit set
        let header = FrameHeader::from_id(0x0DF80510);
        assert_eq!(header.pgn, 129029);
        assert_eq!(header.priority, 3);
        assert_eq!(header.source, 0x10);
    }

    #[test]
    fn test_fast_message_classification() {
        assert!(FrameHeader::from_id(0x0DF80510).is_fast_message());
        assert!(is_fast_message_pgn(126996));
        assert!(is_fast_message_pgn(129540));
        assert!(!is_fast_message_pgn(129025));
        assert!(!is_fast_message_pgn(127250));
        assert!(!is_fast_message_pgn(0));
    }

    #[test]
    fn test_display() {
        let header = FrameHeader::from_id(0x09F80103);
        assert_eq!(header.to_string(), "PGN 129025 prio 2 src 3 dst 255");
    }
}
