//! Receive buffer shared between the scheduler and the host callback.

use crate::hci::MAX_READ_LEN;

/// One reusable buffer for bursts read from the controller.
///
/// `consumed <= available` always holds. While `in_use` is set the buffer
/// belongs to an outstanding read or to bytes the host has not taken yet,
/// and no new read may start.
pub(crate) struct InboundBuffer {
    buf: [u8; MAX_READ_LEN],
    available: usize,
    consumed: usize,
    in_use: bool,
}

impl InboundBuffer {
    pub(crate) const fn new() -> Self {
        Self {
            buf: [0; MAX_READ_LEN],
            available: 0,
            consumed: 0,
            in_use: false,
        }
    }

    /// Claim the buffer for a read.
    pub(crate) fn begin_read(&mut self) -> &mut [u8] {
        debug_assert!(self.consumed == self.available);
        self.available = 0;
        self.consumed = 0;
        self.in_use = true;
        &mut self.buf
    }

    /// Record how many bytes the completed read placed in the buffer.
    pub(crate) fn filled(&mut self, len: usize) {
        self.available = len.min(MAX_READ_LEN);
        self.consumed = 0;
        self.in_use = self.available > 0;
    }

    /// Bytes the host has not consumed yet.
    pub(crate) fn unconsumed(&self) -> &[u8] {
        &self.buf[self.consumed..self.available]
    }

    pub(crate) fn has_unconsumed(&self) -> bool {
        self.consumed < self.available
    }

    /// Advance past `n` bytes taken by the host. Returns `true` once the
    /// burst is fully consumed, at which point the buffer is released.
    pub(crate) fn consume(&mut self, n: usize) -> bool {
        self.consumed = (self.consumed + n).min(self.available);
        if self.consumed == self.available {
            self.reset();
            true
        } else {
            false
        }
    }

    pub(crate) fn in_use(&self) -> bool {
        self.in_use
    }

    pub(crate) fn available(&self) -> usize {
        self.available
    }

    pub(crate) fn consumed(&self) -> usize {
        self.consumed
    }

    pub(crate) fn reset(&mut self) {
        self.available = 0;
        self.consumed = 0;
        self.in_use = false;
    }
}
