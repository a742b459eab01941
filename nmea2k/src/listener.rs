use std::sync::Arc;
use std::sync::mpsc::Sender;

use tracing::trace;

use crate::envelope::{CanonicalMessage, N2kAddress};

/// PGN value of the duplicate notification sent for "any message" subscribers
pub const PGN_ALL: u32 = 1;

/// One delivery to upper layers
///
/// Every completed message produces two notifications sharing the same
/// envelope: one for its own PGN and one for [`PGN_ALL`].
#[derive(Debug, Clone)]
pub struct Notification {
    pub pgn: u32,
    pub message: Arc<CanonicalMessage>,
    /// Encoded envelope bytes
    pub envelope: Arc<[u8]>,
    pub address: N2kAddress,
}

impl Notification {
    pub fn is_all(&self) -> bool {
        self.pgn == PGN_ALL
    }
}

/// Trait for components receiving completed NMEA2000 messages
///
/// Called from the decoding context; implementations should hand the
/// notification off (channel, queue) rather than doing heavy work inline.
pub trait MessageListener {
    fn notify(&mut self, notification: Notification);
}

impl MessageListener for Vec<Notification> {
    fn notify(&mut self, notification: Notification) {
        self.push(notification);
    }
}

impl MessageListener for Sender<Notification> {
    fn notify(&mut self, notification: Notification) {
        if self.send(notification).is_err() {
            trace!("Notification receiver dropped");
        }
    }
}

impl<L: MessageListener + ?Sized> MessageListener for Box<L> {
    fn notify(&mut self, notification: Notification) {
        (**self).notify(notification);
    }
}
