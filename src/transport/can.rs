// SocketCAN transport for the robot's main board (Linux only)
//
// The command frame fits a single classic CAN payload, so each write maps to
// one CAN frame on the configured identifier. Inbound frames from the board
// are drained payload-by-payload into the protocol's byte stream.

use socketcan::{CanFrame, CanSocket, EmbeddedFrame, Frame, Socket, StandardId};
use std::io::ErrorKind;
use tracing::debug;

use super::{Transport, TransportError};
use crate::config::CAN_COMMAND_ID;

/// SocketCAN backed transport
pub struct CanTransport {
    socket: Option<CanSocket>,
    tx_id: StandardId,
}

impl CanTransport {
    /// Open the named CAN interface (e.g. "can0").
    ///
    /// Bitrate and link state are system configuration (`ip link`), not set here.
    pub fn open(interface: &str) -> Result<Self, TransportError> {
        let socket = CanSocket::open(interface)
            .map_err(|e| TransportError::Can(format!("open {}: {}", interface, e)))?;
        socket
            .set_nonblocking(true)
            .map_err(|e| TransportError::Can(format!("set_nonblocking: {}", e)))?;

        let tx_id = StandardId::new(CAN_COMMAND_ID)
            .ok_or_else(|| TransportError::Can(format!("invalid CAN id {:#x}", CAN_COMMAND_ID)))?;
        debug!("Opened CAN transport on {}", interface);

        Ok(Self {
            socket: Some(socket),
            tx_id,
        })
    }
}

impl Transport for CanTransport {
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let socket = self.socket.as_mut().ok_or(TransportError::Closed)?;

        // Classic CAN carries at most 8 bytes per frame
        for chunk in bytes.chunks(8) {
            let frame = CanFrame::new(self.tx_id, chunk)
                .ok_or_else(|| TransportError::Can("frame construction failed".into()))?;
            socket
                .write_frame(&frame)
                .map_err(|e| TransportError::Can(format!("write: {}", e)))?;
        }
        Ok(())
    }

    fn read_available(&mut self) -> Result<Vec<u8>, TransportError> {
        let socket = self.socket.as_mut().ok_or(TransportError::Closed)?;

        let mut bytes = Vec::new();
        loop {
            match socket.read_frame() {
                Ok(frame) => bytes.extend_from_slice(frame.data()),
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => return Err(TransportError::Io(e)),
            }
        }
        Ok(bytes)
    }

    fn is_open(&self) -> bool {
        self.socket.is_some()
    }

    fn close(&mut self) {
        self.socket = None;
    }
}
