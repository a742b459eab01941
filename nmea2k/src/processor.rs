use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, trace};

use crate::envelope::{CanonicalMessage, N2kAddress};
use crate::frame::CanFrame;
use crate::header::FrameHeader;
use crate::listener::{MessageListener, Notification, PGN_ALL};
use crate::reassembly::ReassemblyTable;

/// Turns decoded CAN frames into canonical messages
///
/// Single-frame PGNs are delivered immediately. Fast packet fragments are
/// collected in the [`ReassemblyTable`] and the message is delivered once,
/// when the last fragment arrives.
pub struct FrameProcessor<L: MessageListener> {
    table: ReassemblyTable,
    listener: L,
    interface: String,
    frames_handled: u64,
    messages_emitted: u64,
}

impl<L: MessageListener> FrameProcessor<L> {
    /// # Arguments
    /// * `interface` - Name notifications are attributed to
    /// * `listener` - Receiver of completed messages
    pub fn new(interface: impl Into<String>, listener: L) -> Self {
        Self {
            table: ReassemblyTable::new(),
            listener,
            interface: interface.into(),
            frames_handled: 0,
            messages_emitted: 0,
        }
    }

    /// Process one frame
    ///
    /// # Returns
    /// `Some(message)` if the frame completed a message (it has also been
    /// delivered to the listener), `None` if more fragments are needed
    pub fn handle(&mut self, frame: &CanFrame) -> Option<Arc<CanonicalMessage>> {
        self.handle_at(frame, Instant::now())
    }

    /// [`FrameProcessor::handle`] with an explicit receive time
    pub fn handle_at(&mut self, frame: &CanFrame, now: Instant) -> Option<Arc<CanonicalMessage>> {
        self.frames_handled += 1;
        let header = FrameHeader::from(frame);

        let message = if header.is_fast_message() {
            if let Some(removed) = self.table.check_gc_at(now)
                && removed > 0
            {
                debug!("Garbage collected {} stale fast packets", removed);
            }
            self.handle_fast(&header, frame, now)?
        } else {
            CanonicalMessage::single_frame(&header, frame)
        };

        let message = Arc::new(message);
        self.deliver(Arc::clone(&message));
        Some(message)
    }

    fn handle_fast(
        &mut self,
        header: &FrameHeader,
        frame: &CanFrame,
        now: Instant,
    ) -> Option<CanonicalMessage> {
        let sid = frame.data[0];
        let (id, ready) = match self.table.find_matching(header, sid) {
            Some(id) => (id, self.table.append_at(header, &frame.data, id, now)),
            None => {
                let id = self.table.add_new_at(now);
                (id, self.table.insert(header, &frame.data, id))
            }
        };

        if !ready {
            trace!("Fast packet fragment {:02X} stored for {}", sid, header);
            return None;
        }

        let entry = self.table.remove(id)?;
        Some(CanonicalMessage::fast(header, entry.payload()))
    }

    fn deliver(&mut self, message: Arc<CanonicalMessage>) {
        let envelope: Arc<[u8]> = message.to_bytes().into();
        let address = N2kAddress::from_envelope(&self.interface, &envelope);
        trace!("Delivering {}", message);

        self.listener.notify(Notification {
            pgn: message.pgn,
            message: Arc::clone(&message),
            envelope: Arc::clone(&envelope),
            address: address.clone(),
        });
        self.listener.notify(Notification {
            pgn: PGN_ALL,
            message,
            envelope,
            address,
        });
        self.messages_emitted += 1;
    }

    pub fn table(&self) -> &ReassemblyTable {
        &self.table
    }

    pub fn listener(&self) -> &L {
        &self.listener
    }

    pub fn listener_mut(&mut self) -> &mut L {
        &mut self.listener
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    pub fn frames_handled(&self) -> u64 {
        self.frames_handled
    }

    pub fn messages_emitted(&self) -> u64 {
        self.messages_emitted
    }
}
