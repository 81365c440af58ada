//! Transfer scheduling.
//!
//! Order of service within a step: undelivered inbound bytes, a transfer
//! already in flight, a new read when the peer raised IRQ, then a write once
//! the peer has signalled STATUS. Only one transfer is in flight at a time.

use embassy_time::Instant;
use embedded_hal_1::delay::DelayNs;

use super::{Direction, HciHost, HciTransport};
use crate::error::Error;
use crate::hci::{packet_type, OutboundPacket, MAX_READ_LEN, READ_LOCAL_VERSION_INFO};
use crate::interrupt::Interrupts;
use crate::mode::Mode;
use crate::peer::{Peer, PeerError, Transceiver};
use crate::transport::ChannelState;
use crate::wake;

/// Result of one scheduler step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(super) enum Step {
    /// Nothing to do until the next event.
    Idle,
    /// A transaction completed.
    Progress,
    /// Work is left that cannot progress now, such as a host that did not
    /// take everything or a peer that was not ready; poll again.
    Yield,
    /// A transfer was started and completes on the DONE interrupt.
    InFlight,
}

impl<'d, P, D, M> HciTransport<'d, P, D, M>
where
    P: Peer + Transceiver,
    D: DelayNs,
    M: Mode,
{
    /// Service pending events as of `now`.
    pub fn poll_at(&mut self, now: Instant, host: &mut impl HciHost) {
        let events = self.state.events.take();
        if self.channel_state() != ChannelState::Active {
            return;
        }

        if let Err(e) = self.service(events, now, host) {
            self.fail(e, host);
        }
    }

    fn service(&mut self, events: Interrupts, now: Instant, host: &mut impl HciHost) -> Result<(), Error> {
        if events.contains(Interrupts::FAULT) {
            return Err(Error::HardwareFault(PeerError::Bus));
        }
        if events.contains(Interrupts::STATUS) {
            self.status_ready = true;
        }
        if self.heartbeat.poll(now) {
            self.send_heartbeat();
        }

        if M::BLOCKING {
            self.run_burst(now, host)?;
        } else {
            self.run_single(now, host)?;
        }

        self.arbitrate_wake();
        Ok(())
    }

    /// Run transactions back to back, up to the per-poll limit.
    fn run_burst(&mut self, now: Instant, host: &mut impl HciHost) -> Result<(), Error> {
        let mut transactions = 0;
        loop {
            match self.step(now, host)? {
                Step::Idle | Step::InFlight => return Ok(()),
                Step::Yield => {
                    self.state.events.post_transfer_needed();
                    return Ok(());
                }
                Step::Progress => {
                    transactions += 1;
                    if transactions >= self.config.max_transactions_per_poll {
                        if self.has_work() {
                            return Err(Error::TooManySuccessiveTransactions);
                        }
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Run one step and ask for another poll if more is pending.
    fn run_single(&mut self, now: Instant, host: &mut impl HciHost) -> Result<(), Error> {
        match self.step(now, host)? {
            Step::Idle | Step::InFlight => {}
            Step::Yield => self.state.events.post_transfer_needed(),
            Step::Progress => {
                if self.has_work() {
                    self.state.events.post_transfer_needed();
                }
            }
        }
        Ok(())
    }

    pub(super) fn step(&mut self, now: Instant, host: &mut impl HciHost) -> Result<Step, Error> {
        if self.inbound.has_unconsumed() {
            return Ok(self.deliver(now, host));
        }

        match self.in_flight {
            Some(Direction::Read(seen)) => return self.read(now, host, seen),
            Some(Direction::Write) => return self.write_head(now),
            None => {}
        }

        if self.irq_pending() {
            let seen = self.state.events.irqs_seen();
            self.peer.set_wake(false);
            return self.read(now, host, seen);
        }

        if self.status_ready && self.load_head() {
            return self.write_head(now);
        }

        Ok(Step::Idle)
    }

    fn has_work(&self) -> bool {
        self.inbound.has_unconsumed()
            || self.in_flight.is_some()
            || self.irq_pending()
            || (self.status_ready && (self.outbound.is_some() || self.state.pending_writes() > 0))
    }

    /// The peer holds IRQ high for a burst that has not been read yet.
    fn irq_pending(&self) -> bool {
        self.peer.irq_line() && self.state.events.irqs_seen() != self.irqs_serviced
    }

    /// Read the burst signalled by IRQ edge count `seen`. The edge only counts
    /// as serviced once the read has completed.
    fn read(&mut self, now: Instant, host: &mut impl HciHost, seen: u32) -> Result<Step, Error> {
        match self.peer.read(self.inbound.begin_read()) {
            Ok(len) => {
                self.in_flight = None;
                self.irqs_serviced = seen;
                if len > MAX_READ_LEN {
                    self.inbound.reset();
                    return Err(Error::PacketTooLarge { len, max: MAX_READ_LEN });
                }

                self.inbound.filled(len);
                self.stats.reads += 1;
                trace!("HCI read {} bytes", len);

                self.wait_irq_settle()?;
                if len == 0 {
                    return Ok(Step::Idle);
                }
                Ok(self.deliver(now, host))
            }
            Err(nb::Error::WouldBlock) if M::BLOCKING => {
                trace!("HCI read not ready");
                self.inbound.reset();
                Ok(Step::Yield)
            }
            Err(nb::Error::WouldBlock) => {
                self.in_flight = Some(Direction::Read(seen));
                Ok(Step::InFlight)
            }
            Err(nb::Error::Other(e)) if e.is_transient() => {
                debug!("HCI read deferred: {:?}", e);
                self.in_flight = None;
                self.inbound.reset();
                Ok(Step::Yield)
            }
            Err(nb::Error::Other(e)) => {
                self.in_flight = None;
                self.inbound.reset();
                Err(Error::HardwareFault(e))
            }
        }
    }

    /// Wait for the peer to drop IRQ after a read. A new IRQ edge means the
    /// line is already signalling the next burst.
    fn wait_irq_settle(&mut self) -> Result<(), Error> {
        let mut waited_us = 0;
        while self.peer.irq_line() {
            if self.state.events.irqs_seen() != self.irqs_serviced {
                return Ok(());
            }
            if waited_us >= self.config.irq_timeout_us {
                error!("IRQ still high {}us after read", waited_us);
                return Err(Error::HardwareFault(PeerError::IrqStuck));
            }
            self.delay.delay_us(1);
            waited_us += 1;
        }
        Ok(())
    }

    fn deliver(&mut self, now: Instant, host: &mut impl HciHost) -> Step {
        let pending = self.inbound.unconsumed();
        let offered = pending.len();
        let taken = host.on_data_received(pending).min(offered);

        if self.inbound.consume(taken) {
            self.heartbeat.restart(now);
            Step::Progress
        } else {
            debug!("Host took {} of {} bytes", taken, offered);
            Step::Yield
        }
    }

    fn load_head(&mut self) -> bool {
        if self.outbound.is_none() {
            self.outbound = self.state.with_queue(|q| q.peek().cloned());
        }
        self.outbound.is_some()
    }

    fn write_head(&mut self, now: Instant) -> Result<Step, Error> {
        let Some(packet) = self.outbound.as_ref() else {
            self.in_flight = None;
            return Ok(Step::Idle);
        };

        match self.peer.write(packet.as_bytes()) {
            Ok(()) => {
                trace!("HCI wrote {} bytes", packet.len());
                self.in_flight = None;
                self.outbound = None;
                self.state.with_queue(|q| q.pop());
                self.write_attempts = 0;
                self.status_ready = false;
                self.peer.set_wake(false);
                self.heartbeat.restart(now);
                self.stats.writes += 1;
                Ok(Step::Progress)
            }
            Err(nb::Error::WouldBlock) if M::BLOCKING => {
                trace!("HCI write not ready");
                self.rearm_write();
                Ok(Step::Yield)
            }
            Err(nb::Error::WouldBlock) => {
                self.in_flight = Some(Direction::Write);
                Ok(Step::InFlight)
            }
            Err(nb::Error::Other(e)) if e.is_transient() => {
                debug!("HCI write deferred: {:?}", e);
                self.in_flight = None;
                self.rearm_write();
                Ok(Step::Yield)
            }
            Err(nb::Error::Other(e)) => {
                self.in_flight = None;
                self.write_attempts = self.write_attempts.saturating_add(1);
                if self.write_attempts > self.config.write_retries {
                    error!("HCI write failed {} times: {:?}", self.write_attempts, e);
                    return Err(Error::HardwareFault(e));
                }
                warn!(
                    "HCI write failed ({}/{}): {:?}",
                    self.write_attempts, self.config.write_retries, e
                );
                self.rearm_write();
                Ok(Step::Yield)
            }
        }
    }

    /// Drop wake so the next attempt waits for a fresh STATUS from the peer.
    fn rearm_write(&mut self) {
        self.status_ready = false;
        self.peer.set_wake(false);
    }

    fn send_heartbeat(&mut self) {
        let Ok(packet) = OutboundPacket::new(packet_type::COMMAND, &READ_LOCAL_VERSION_INFO) else {
            return;
        };
        match self.state.enqueue(packet) {
            Ok(()) => {
                debug!("Channel idle, queueing heartbeat");
                self.stats.heartbeats += 1;
            }
            Err(_) => debug!("Heartbeat skipped, write queue full"),
        }
    }

    fn arbitrate_wake(&mut self) {
        if self.in_flight.is_some() || self.inbound.in_use() {
            return;
        }
        let has_work = self.outbound.is_some() || self.state.pending_writes() > 0;
        let outcome = wake::arbitrate(&mut self.peer, has_work);
        trace!("Wake: {:?}", outcome);
    }
}
