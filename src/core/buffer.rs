//! Bounded receive buffer shared between a transport's reader and its callers
//!
//! The buffer is append-only between explicit clears: polling renders the
//! current contents without consuming them, so repeated polls return the same
//! snapshot until more data arrives or the caller clears.

use parking_lot::Mutex;
use tracing::warn;

/// Default receive buffer capacity for serial lines.
pub const SERIAL_BUFFER_CAPACITY: usize = 1024;

/// Default receive buffer capacity for TCP sockets.
pub const SOCKET_BUFFER_CAPACITY: usize = 2048;

/// Fixed-capacity byte accumulator with hex/text rendering.
///
/// A write that would exceed capacity discards the whole buffer and resets it
/// to empty. Callers are expected to poll and clear inside short
/// request/response cycles, so the buffer never grows or wraps.
pub struct ReceiveBuffer {
    inner: Mutex<Vec<u8>>,
    capacity: usize,
}

impl ReceiveBuffer {
    /// Create a buffer with the given capacity in bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
        }
    }

    /// Append incoming bytes.
    ///
    /// Returns `false` when the write would exceed capacity; the buffer is
    /// then reset to empty and the incoming bytes are dropped.
    pub fn append(&self, bytes: &[u8]) -> bool {
        let mut data = self.inner.lock();
        if data.len() + bytes.len() > self.capacity {
            warn!(
                capacity = self.capacity,
                held = data.len(),
                incoming = bytes.len(),
                "receive buffer overflow, discarding contents"
            );
            data.clear();
            return false;
        }
        data.extend_from_slice(bytes);
        true
    }

    /// Render the current contents without consuming them.
    ///
    /// Hex form is two uppercase digits per byte, single-space separated.
    /// Text form decodes the bytes as UTF-8, replacing invalid sequences.
    pub fn render(&self, as_hex: bool) -> String {
        let data = self.inner.lock();
        if data.is_empty() {
            return String::new();
        }
        if as_hex {
            data.iter()
                .map(|b| format!("{b:02X}"))
                .collect::<Vec<_>>()
                .join(" ")
        } else {
            String::from_utf8_lossy(&data).into_owned()
        }
    }

    /// Reset the buffer to empty.
    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    /// Number of bytes currently held.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// True when no bytes are held.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
