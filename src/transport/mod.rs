// Byte transports for the robot link
//
// The protocol layer only sees the `Transport` trait: a bidirectional byte
// channel with non-blocking reads. Concrete backends are a serial port and,
// on Linux, a SocketCAN interface.

mod serial;

#[cfg(target_os = "linux")]
mod can;

#[cfg(test)]
pub mod mock;

pub use serial::SerialTransport;

#[cfg(target_os = "linux")]
pub use can::CanTransport;

/// Error types for transport I/O
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CAN bus error: {0}")]
    Can(String),

    #[error("Transport kind {0:?} is not supported on this platform")]
    Unsupported(TransportKind),

    #[error("Transport is closed")]
    Closed,
}

/// Which physical link carries the robot protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Serial,
    Can,
}

/// Bidirectional byte channel to the robot.
///
/// Writes are bounded by the backend's own timeout; reads never block and
/// return whatever bytes have arrived since the last call (possibly none).
pub trait Transport: Send {
    /// Write one complete frame worth of bytes.
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Drain whatever bytes the device has made available.
    fn read_available(&mut self) -> Result<Vec<u8>, TransportError>;

    /// Whether the underlying device handle is still open.
    fn is_open(&self) -> bool;

    /// Release the device handle.
    fn close(&mut self);
}

/// Open a transport of the requested kind on `device`.
pub fn open_transport(
    kind: TransportKind,
    device: &str,
) -> Result<Box<dyn Transport>, TransportError> {
    match kind {
        TransportKind::Serial => Ok(Box::new(SerialTransport::open(device)?)),
        #[cfg(target_os = "linux")]
        TransportKind::Can => Ok(Box::new(CanTransport::open(device)?)),
        #[cfg(not(target_os = "linux"))]
        TransportKind::Can => Err(TransportError::Unsupported(kind)),
    }
}
