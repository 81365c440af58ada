//! Scripted controller, delay and host for unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::vec::Vec;

use embedded_hal_1::delay::DelayNs;

use crate::error::Error;
use crate::peer::{Interrupts, Peer, PeerError, Transceiver, TxPower};
use crate::transport::{HciHost, State};

/// Peer operations worth asserting on. Wake and interrupt-mask changes are
/// tracked through dedicated fields instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Op {
    PowerOn,
    PowerOff,
    Configure,
    Boot,
    TxPower(u8),
    Sleep(bool),
    /// Completed read; declared burst length.
    Read(usize),
    /// Completed write; frame length.
    Write(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transfer {
    Read,
    Write,
}

pub(crate) struct MockPeer {
    state: Option<&'static State>,

    pub ops: Vec<Op>,
    pub writes: Vec<Vec<u8>>,
    /// Bursts the controller will hand out, one per read.
    pub bursts: VecDeque<Vec<u8>>,

    pub irq: bool,
    pub busy: bool,
    pub wake: bool,
    pub wake_edges: usize,
    pub powered: bool,
    pub interrupts_enabled: Interrupts,

    pub configure_result: Result<(), PeerError>,
    pub boot_results: VecDeque<Result<(), PeerError>>,
    pub read_errors: VecDeque<nb::Error<PeerError>>,
    pub write_results: VecDeque<nb::Result<(), PeerError>>,

    /// Keep IRQ high after the last burst was read.
    pub irq_stuck: bool,
    /// Raise STATUS on every rising wake edge while not busy.
    pub status_on_wake: bool,
    /// Raise IRQ in the same instant wake is asserted.
    pub raise_irq_on_wake: bool,
    /// Transfers complete on DONE instead of inside the call.
    pub nonblocking: bool,
    in_flight: Option<Transfer>,
}

impl MockPeer {
    /// A peer not wired to any interrupt mailbox.
    pub fn detached() -> Self {
        Self {
            state: None,
            ops: Vec::new(),
            writes: Vec::new(),
            bursts: VecDeque::new(),
            irq: false,
            busy: false,
            wake: false,
            wake_edges: 0,
            powered: false,
            interrupts_enabled: Interrupts::NONE,
            configure_result: Ok(()),
            boot_results: VecDeque::new(),
            read_errors: VecDeque::new(),
            write_results: VecDeque::new(),
            irq_stuck: false,
            status_on_wake: false,
            raise_irq_on_wake: false,
            nonblocking: false,
            in_flight: None,
        }
    }

    /// A peer whose interrupts land in `state`'s mailbox.
    pub fn new(state: &'static State) -> Self {
        Self {
            state: Some(state),
            status_on_wake: true,
            ..Self::detached()
        }
    }

    pub fn nonblocking(state: &'static State) -> Self {
        Self {
            nonblocking: true,
            ..Self::new(state)
        }
    }

    fn raise(&self, causes: Interrupts) {
        if let Some(state) = self.state {
            state.events().record(causes);
        }
    }

    /// Queue a burst and raise IRQ if it is not already signalling one.
    pub fn push_burst(&mut self, bytes: &[u8]) {
        self.bursts.push_back(bytes.to_vec());
        if !self.irq {
            self.irq = true;
            self.raise(Interrupts::IRQ);
        }
    }

    pub fn count(&self, op: Op) -> usize {
        self.ops.iter().filter(|&&o| o == op).count()
    }

    /// Completed reads and writes, in order.
    pub fn transfers(&self) -> Vec<Op> {
        self.ops
            .iter()
            .copied()
            .filter(|op| matches!(op, Op::Read(_) | Op::Write(_)))
            .collect()
    }

    /// Split a transfer into start and completion when non-blocking.
    fn begin(&mut self, kind: Transfer) -> nb::Result<(), PeerError> {
        if !self.nonblocking {
            return Ok(());
        }
        match self.in_flight {
            None => {
                self.in_flight = Some(kind);
                self.raise(Interrupts::DONE);
                Err(nb::Error::WouldBlock)
            }
            Some(current) if current == kind => {
                self.in_flight = None;
                Ok(())
            }
            Some(current) => panic!("{:?} started while {:?} is in flight", kind, current),
        }
    }
}

impl Peer for MockPeer {
    fn power(&mut self, on: bool) -> Result<(), PeerError> {
        self.ops.push(if on { Op::PowerOn } else { Op::PowerOff });
        self.powered = on;
        if !on {
            self.irq = false;
            self.wake = false;
            self.bursts.clear();
            self.in_flight = None;
        }
        Ok(())
    }

    fn configure(&mut self) -> Result<(), PeerError> {
        self.ops.push(Op::Configure);
        self.configure_result
    }

    fn boot(&mut self) -> Result<(), PeerError> {
        self.ops.push(Op::Boot);
        self.boot_results.pop_front().unwrap_or(Ok(()))
    }

    fn set_wake(&mut self, asserted: bool) {
        if asserted && !self.wake {
            self.wake_edges += 1;
            self.wake = true;
            if self.raise_irq_on_wake {
                self.irq = true;
                self.raise(Interrupts::IRQ);
            } else if self.status_on_wake && !self.busy {
                self.raise(Interrupts::STATUS);
            }
        } else if !asserted {
            self.wake = false;
        }
    }

    fn irq_line(&self) -> bool {
        self.irq
    }

    fn busy_line(&self) -> bool {
        self.busy
    }

    fn enable_interrupts(&mut self, which: Interrupts) {
        self.interrupts_enabled |= which;
    }

    fn disable_interrupts(&mut self, which: Interrupts) {
        self.interrupts_enabled = Interrupts::from_bits(self.interrupts_enabled.bits() & !which.bits());
    }

    fn clear_interrupts(&mut self, _which: Interrupts) {}

    fn set_tx_power(&mut self, level: TxPower) -> Result<(), PeerError> {
        self.ops.push(Op::TxPower(level.0));
        Ok(())
    }

    fn set_sleep(&mut self, enabled: bool) -> Result<(), PeerError> {
        self.ops.push(Op::Sleep(enabled));
        Ok(())
    }
}

impl Transceiver for MockPeer {
    fn read(&mut self, buf: &mut [u8]) -> nb::Result<usize, PeerError> {
        self.begin(Transfer::Read)?;
        if let Some(e) = self.read_errors.pop_front() {
            return Err(e);
        }

        let Some(burst) = self.bursts.pop_front() else {
            self.irq = self.irq_stuck;
            self.ops.push(Op::Read(0));
            return Ok(0);
        };

        let n = burst.len().min(buf.len());
        buf[..n].copy_from_slice(&burst[..n]);
        self.ops.push(Op::Read(burst.len()));

        if self.bursts.is_empty() {
            self.irq = self.irq_stuck;
        } else {
            // IRQ drops and rises again for the next burst.
            self.raise(Interrupts::IRQ);
        }
        Ok(burst.len())
    }

    fn write(&mut self, frame: &[u8]) -> nb::Result<(), PeerError> {
        self.begin(Transfer::Write)?;
        if let Some(Err(e)) = self.write_results.pop_front() {
            return Err(e);
        }
        self.ops.push(Op::Write(frame.len()));
        self.writes.push(frame.to_vec());
        Ok(())
    }
}

/// Delay that only adds up the time asked for.
#[derive(Default)]
pub(crate) struct MockDelay {
    ns: u64,
}

impl MockDelay {
    pub fn total_ms(&self) -> u64 {
        self.ns / 1_000_000
    }

    pub fn total_us(&self) -> u64 {
        self.ns / 1_000
    }
}

impl DelayNs for MockDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.ns += u64::from(ns);
    }
}

/// Host that records every offer and takes as much as scripted.
#[derive(Default)]
pub(crate) struct MockHost {
    /// Every slice offered, in order.
    pub offered: Vec<Vec<u8>>,
    /// What was taken from each offer.
    pub taken: Vec<Vec<u8>>,
    /// Bytes to take on successive offers; everything once exhausted.
    pub accept: VecDeque<usize>,
    pub resets: usize,
}

impl MockHost {
    /// All bytes the host has taken, concatenated.
    pub fn received(&self) -> Vec<u8> {
        self.taken.concat()
    }
}

impl HciHost for MockHost {
    fn on_data_received(&mut self, data: &[u8]) -> usize {
        self.offered.push(data.to_vec());
        let n = self.accept.pop_front().unwrap_or(data.len()).min(data.len());
        self.taken.push(data[..n].to_vec());
        n
    }

    fn on_reset(&mut self) {
        self.resets += 1;
    }
}

/// Collects errors passed to a registered error handler.
pub(crate) struct ErrorLog(Mutex<Vec<Error>>);

impl ErrorLog {
    pub const fn new() -> Self {
        Self(Mutex::new(Vec::new()))
    }

    pub fn push(&self, err: Error) {
        self.0.lock().unwrap().push(err);
    }

    pub fn take(&self) -> Vec<Error> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }
}

/// A `'static` transport state for one test.
pub(crate) fn leak_state() -> &'static State {
    Box::leak(Box::new(State::new()))
}
