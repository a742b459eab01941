use socketcan::{CanSocket, Socket};
use std::{error::Error, time::Duration};
use tracing::{info, warn};

use crate::frame::CanFrame;

/// Opens a CAN socket, retrying every 10 seconds until it succeeds
///
/// # Arguments
/// * `interface` - Name of the CAN interface (e.g., "can0", "vcan0")
pub fn open_can_socket_with_retry(interface: &str) -> CanSocket {
    loop {
        match CanSocket::open(interface) {
            Ok(socket) => {
                info!("Successfully opened CAN interface: {}", interface);
                return socket;
            }
            Err(e) => {
                warn!("Failed to open CAN interface '{}': {}", interface, e);
                warn!("Retrying in 10 seconds...");
                std::thread::sleep(Duration::from_secs(10));
            }
        }
    }
}

/// Sets a read timeout so the reading loop gets control back without traffic
pub fn configure_nmea2k_socket(socket: &mut CanSocket) -> Result<(), Box<dyn Error>> {
    socket.set_read_timeout(Duration::from_millis(500))?;
    Ok(())
}

/// Reads one frame from the bus
///
/// Frames with a standard (11-bit) identifier are rejected, NMEA2000 only
/// uses extended identifiers.
pub fn read_can_frame(socket: &CanSocket) -> Result<CanFrame, std::io::Error> {
    let frame = socket.read_frame()?;
    if !socketcan::EmbeddedFrame::is_extended(&frame) {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "Invalid CAN ID for NMEA2000",
        ));
    }
    Ok(CanFrame::from(&frame))
}
