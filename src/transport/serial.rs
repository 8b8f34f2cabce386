// Serial transport for the robot's main board

use serialport::{self, SerialPort};
use std::io::{Read, Write};
use std::time::Duration;
use tracing::debug;

use super::{Transport, TransportError};
use crate::config::{SERIAL_BAUDRATE, SERIAL_TIMEOUT_MS};

/// Serial-port backed transport
pub struct SerialTransport {
    port: Option<Box<dyn SerialPort>>,
}

impl SerialTransport {
    /// Open a new connection to the robot
    pub fn open(device: &str) -> Result<Self, TransportError> {
        Self::open_with_baudrate(device, SERIAL_BAUDRATE)
    }

    /// Open with custom baudrate
    pub fn open_with_baudrate(device: &str, baudrate: u32) -> Result<Self, TransportError> {
        let port = serialport::new(device, baudrate)
            .timeout(Duration::from_millis(SERIAL_TIMEOUT_MS))
            .open()?;
        debug!("Opened serial transport on {} at {} baud", device, baudrate);

        Ok(Self { port: Some(port) })
    }
}

impl Transport for SerialTransport {
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let port = self.port.as_mut().ok_or(TransportError::Closed)?;
        port.write_all(bytes)?;
        port.flush()?;
        Ok(())
    }

    fn read_available(&mut self) -> Result<Vec<u8>, TransportError> {
        let port = self.port.as_mut().ok_or(TransportError::Closed)?;

        let pending = port.bytes_to_read()? as usize;
        if pending == 0 {
            return Ok(Vec::new());
        }

        let mut buf = vec![0u8; pending];
        port.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn close(&mut self) {
        self.port = None;
    }
}
