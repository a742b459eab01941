//! NMEA2000 network transport core
//!
//! This library turns a stream of raw CAN frames into complete NMEA2000
//! messages:
//! - Identifier decoding (priority, PGN, source, destination)
//! - Fast packet reassembly with stale-entry garbage collection
//! - Canonical envelope encoding of every completed message
//! - A thread-safe receive ring and ASCII line decoding for network sessions
//! - SocketCAN input
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use nmea2k::{ByteRing, FrameProcessor, N2kSession, Notification};
//!
//! let processor = FrameProcessor::new("n2k-net", Vec::<Notification>::new());
//! let mut session = N2kSession::new(Arc::new(ByteRing::default()), processor);
//!
//! session.on_bytes_received(b"0.000 can0 09F80103 01 02 03 04 05 06 07 08\n");
//! session.drain();
//!
//! let notifications = session.processor().listener();
//! assert_eq!(notifications[0].pgn, 129025);
//! assert_eq!(notifications[1].pgn, nmea2k::PGN_ALL);
//! ```

pub mod canbus;
pub mod envelope;
pub mod frame;
pub mod header;
pub mod listener;
pub mod processor;
pub mod reassembly;
pub mod ring;
pub mod session;

// Re-export commonly used types
pub use canbus as CanBus;
pub use envelope::{CanonicalMessage, N2kAddress};
pub use frame::CanFrame;
pub use header::FrameHeader;
pub use listener::{MessageListener, Notification, PGN_ALL};
pub use processor::FrameProcessor;
pub use reassembly::{EntryId, ReassemblyStats, ReassemblyTable};
pub use ring::{ByteRing, RX_BUFFER_SIZE_NET};
pub use session::{LineTokenizer, MAX_LINE_LEN, N2kSession};
