use socketcan::{EmbeddedFrame, ExtendedId, Id};
use tracing::trace;

/// Maximum payload of a classic CAN frame
pub const CAN_MAX_DLEN: usize = 8;

/// Mask for the 29 bits of an extended CAN identifier
pub const CAN_EFF_MASK: u32 = 0x1FFF_FFFF;

/// One raw bus frame: 29-bit identifier and up to 8 data bytes.
///
/// The data array is always 8 bytes long; frames shorter than 8 bytes are
/// zero-padded and `len` keeps the original length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanFrame {
    pub id: u32,
    pub data: [u8; CAN_MAX_DLEN],
    pub len: u8,
}

impl CanFrame {
    pub fn new(id: u32, data: &[u8]) -> Self {
        let len = data.len().min(CAN_MAX_DLEN);
        let mut padded = [0u8; CAN_MAX_DLEN];
        padded[..len].copy_from_slice(&data[..len]);
        Self {
            id,
            data: padded,
            len: len as u8,
        }
    }

    /// Parse one line of the ASCII debug transport
    ///
    /// Tokens are separated by spaces. The first two tokens are ignored, the
    /// third is the identifier in hex, and up to eight hex data bytes follow.
    /// Missing bytes are zero. A token that is not valid hex parses as zero
    /// and the frame is still produced.
    pub fn from_ascii_line(line: &str) -> Self {
        let mut tokens = line.split(' ').filter(|t| !t.is_empty()).skip(2);

        let id = tokens.next().map(parse_hex_token).unwrap_or(0);

        let mut data = [0u8; CAN_MAX_DLEN];
        for (slot, token) in data.iter_mut().zip(tokens) {
            // Only the low byte is kept, like a narrowing store
            *slot = parse_hex_token(token) as u8;
        }

        Self {
            id,
            data,
            len: CAN_MAX_DLEN as u8,
        }
    }

    /// Payload bytes as received (without padding)
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }

    pub fn extended_id(&self) -> Option<ExtendedId> {
        ExtendedId::new(self.id & CAN_EFF_MASK)
    }
}

fn parse_hex_token(token: &str) -> u32 {
    match u32::from_str_radix(token.trim(), 16) {
        Ok(value) => value,
        Err(_) => {
            trace!("Invalid hex token '{}', using 0", token);
            0
        }
    }
}

impl From<&socketcan::CanFrame> for CanFrame {
    fn from(frame: &socketcan::CanFrame) -> Self {
        let id = match frame.id() {
            Id::Extended(id) => id.as_raw(),
            Id::Standard(id) => id.as_raw() as u32,
        };
        CanFrame::new(id, frame.data())
    }
}
