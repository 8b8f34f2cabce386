// In-memory transport for protocol tests

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{Transport, TransportError};

/// Transport double that records writes and replays queued response bytes.
///
/// Clones share state, so a test can keep one clone and hand the other to the
/// protocol object under test.
#[derive(Clone, Default)]
pub struct MockTransport {
    written: Arc<Mutex<Vec<u8>>>,
    rx: Arc<Mutex<VecDeque<u8>>>,
    closed: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, in order.
    pub fn written(&self) -> Vec<u8> {
        self.written.lock().clone()
    }

    pub fn clear_written(&self) {
        self.written.lock().clear();
    }

    /// Queue bytes to be returned by the next `read_available` calls.
    pub fn queue_response(&self, bytes: &[u8]) {
        self.rx.lock().extend(bytes.iter().copied());
    }

    /// Make subsequent writes fail, as an unplugged device would.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl Transport for MockTransport {
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "mock write failure",
            )));
        }
        self.written.lock().extend_from_slice(bytes);
        Ok(())
    }

    fn read_available(&mut self) -> Result<Vec<u8>, TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        Ok(self.rx.lock().drain(..).collect())
    }

    fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
