//! Bounded FIFO of outbound HCI packets.

use heapless::Deque;

use crate::hci::OutboundPacket;

/// Number of outbound packets that can wait for the controller.
pub const WRITE_QUEUE_SLOTS: usize = 8;

/// Returned by [`WriteQueue::enqueue`] when every slot is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct QueueFull;

/// Fixed-capacity circular buffer of [`OutboundPacket`]s.
///
/// The head packet stays in the queue until the controller has accepted it;
/// only then does the scheduler [`pop`](Self::pop) it.
pub struct WriteQueue {
    slots: Deque<OutboundPacket, WRITE_QUEUE_SLOTS>,
}

impl WriteQueue {
    pub const fn new() -> Self {
        Self { slots: Deque::new() }
    }

    /// Append a packet. Never blocks; a full queue rejects the packet.
    pub fn enqueue(&mut self, packet: OutboundPacket) -> Result<(), QueueFull> {
        self.slots.push_back(packet).map_err(|_| QueueFull)
    }

    /// The packet to be sent next.
    pub fn peek(&self) -> Option<&OutboundPacket> {
        self.slots.front()
    }

    /// Remove the head packet once the controller accepted it.
    pub fn pop(&mut self) -> Option<OutboundPacket> {
        self.slots.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.slots.is_full()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Drop every pending packet, returning how many were dropped.
    pub fn flush(&mut self) -> usize {
        let dropped = self.slots.len();
        self.slots.clear();
        dropped
    }
}

impl Default for WriteQueue {
    fn default() -> Self {
        Self::new()
    }
}
