//! Per-connection decoding state
//!
//! A session owns the receive ring, the line tokenizer and the frame
//! processor of one transport connection. The I/O side only needs the ring
//! (see [`N2kSession::ring`]); the decoding side calls [`N2kSession::drain`].

use std::sync::Arc;

use tracing::trace;

use crate::frame::CanFrame;
use crate::listener::MessageListener;
use crate::processor::FrameProcessor;
use crate::ring::{ByteRing, RX_BUFFER_SIZE_NET};

const LINE_FEED: u8 = 0x0A;
const CARRIAGE_RETURN: u8 = 0x0D;

/// Longest line kept before it is thrown away
pub const MAX_LINE_LEN: usize = RX_BUFFER_SIZE_NET;

/// Accumulates characters into lines terminated by LF
///
/// CR and LF are never part of a line. A line longer than [`MAX_LINE_LEN`]
/// is discarded up to and including its LF.
#[derive(Debug, Default)]
pub struct LineTokenizer {
    line: String,
    overflow: bool,
}

impl LineTokenizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one byte, returns the completed line on LF
    pub fn push(&mut self, byte: u8) -> Option<String> {
        match byte {
            LINE_FEED if self.overflow => {
                self.overflow = false;
                None
            }
            LINE_FEED => Some(std::mem::take(&mut self.line)),
            CARRIAGE_RETURN => None,
            _ if self.overflow => None,
            _ if self.line.len() >= MAX_LINE_LEN => {
                trace!("Discarding line longer than {} characters", MAX_LINE_LEN);
                self.line.clear();
                self.overflow = true;
                None
            }
            _ => {
                self.line.push(byte as char);
                None
            }
        }
    }

    /// Characters received since the last line feed
    pub fn pending(&self) -> &str {
        &self.line
    }
}

/// Decoding state of one transport session
pub struct N2kSession<L: MessageListener> {
    ring: Arc<ByteRing>,
    tokenizer: LineTokenizer,
    processor: FrameProcessor<L>,
}

impl<L: MessageListener> N2kSession<L> {
    pub fn new(ring: Arc<ByteRing>, processor: FrameProcessor<L>) -> Self {
        Self {
            ring,
            tokenizer: LineTokenizer::new(),
            processor,
        }
    }

    /// Handle for the receive side
    pub fn ring(&self) -> Arc<ByteRing> {
        Arc::clone(&self.ring)
    }

    pub fn on_bytes_received(&self, bytes: &[u8]) {
        self.ring.put_slice(bytes);
    }

    /// Decode everything currently in the ring
    ///
    /// # Returns
    /// Number of frames handed to the processor
    pub fn drain(&mut self) -> usize {
        let mut frames = 0;
        while let Some(byte) = self.ring.try_get() {
            if let Some(line) = self.tokenizer.push(byte) {
                trace!("Received line '{}'", line);
                let frame = CanFrame::from_ascii_line(&line);
                self.processor.handle(&frame);
                frames += 1;
            }
        }
        frames
    }

    pub fn processor(&self) -> &FrameProcessor<L> {
        &self.processor
    }

    pub fn processor_mut(&mut self) -> &mut FrameProcessor<L> {
        &mut self.processor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::Notification;

    fn session(capacity: usize) -> N2kSession<Vec<Notification>> {
        N2kSession::new(
            Arc::new(ByteRing::new(capacity)),
            FrameProcessor::new("test", Vec::new()),
        )
    }

    #[test]
    fn test_tokenizer_strips_cr_lf() {
        let mut tokenizer = LineTokenizer::new();
        let mut lines = Vec::new();
        for &b in b"ab\r\ncd\n" {
            if let Some(line) = tokenizer.push(b) {
                lines.push(line);
            }
        }
        assert_eq!(lines, vec!["ab".to_string(), "cd".to_string()]);
        assert_eq!(tokenizer.pending(), "");
    }

    #[test]
    fn test_tokenizer_keeps_partial_line() {
        let mut tokenizer = LineTokenizer::new();
        for &b in b"12 can0 09F8" {
            assert!(tokenizer.push(b).is_none());
        }
        assert_eq!(tokenizer.pending(), "12 can0 09F8");
    }

    #[test]
    fn test_tokenizer_discards_overlong_line() {
        let mut tokenizer = LineTokenizer::new();
        for _ in 0..MAX_LINE_LEN {
            assert!(tokenizer.push(b'A').is_none());
        }
        assert_eq!(tokenizer.pending().len(), MAX_LINE_LEN);

        // One more character drops everything up to the next LF
        for &b in b"BCD" {
            assert!(tokenizer.push(b).is_none());
        }
        assert_eq!(tokenizer.pending(), "");
        assert!(tokenizer.push(b'\n').is_none());

        let mut lines = Vec::new();
        for &b in b"ok\n" {
            if let Some(line) = tokenizer.push(b) {
                lines.push(line);
            }
        }
        assert_eq!(lines, vec!["ok".to_string()]);
    }

    #[test]
    fn test_overlong_line_is_not_decoded() {
        let mut session = session(2 * MAX_LINE_LEN);
        let mut bytes = vec![b'0'; MAX_LINE_LEN + 10];
        bytes.push(b'\n');
        bytes.extend_from_slice(b"0.1 can0 09F80103 01\n");
        session.on_bytes_received(&bytes);

        assert_eq!(session.drain(), 1);
        assert_eq!(session.processor().listener()[0].pgn, 129025);
    }

    #[test]
    fn test_drain_decodes_lines() {
        let mut session = session(1024);
        session.on_bytes_received(b"0.1 can0 09F80103 01 02 03 04 05 06 07 08\r\n");

        assert_eq!(session.drain(), 1);
        let notifications = session.processor().listener();
        assert_eq!(notifications.len(), 2);
        assert_eq!(notifications[0].pgn, 129025);
        assert_eq!(notifications[0].message.payload, vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_line_split_across_reads() {
        let mut session = session(1024);
        session.on_bytes_received(b"0.1 can0 09F801");
        assert_eq!(session.drain(), 0);
        session.on_bytes_received(b"03 AA\n");
        assert_eq!(session.drain(), 1);
        assert_eq!(session.processor().listener()[0].message.payload[0], 0xAA);
    }

    #[test]
    fn test_fast_packet_over_session() {
        let mut session = session(1024);
        session.on_bytes_received(
            b"0.1 can0 0DF80510 20 0A 01 02 03 04 05 06\n0.2 can0 0DF80510 21 07 08 09 0A FF FF FF\n",
        );
        assert_eq!(session.drain(), 2);

        let notifications = session.processor().listener();
        assert_eq!(notifications.len(), 2);
        assert_eq!(notifications[0].pgn, 129029);
        assert_eq!(notifications[0].message.payload, (1..=10).collect::<Vec<u8>>());
    }

    #[test]
    fn test_ring_handle_shared_with_reader() {
        let mut session = session(64);
        let ring = session.ring();
        ring.put_slice(b"x y 09F80103\n");
        assert_eq!(session.drain(), 1);
        assert!(ring.empty());
    }
}
