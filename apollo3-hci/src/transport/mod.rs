//! HCI transport: outbound queue, inbound delivery and the transfer scheduler.
//!
//! [`State`] is the part shared with the interrupt handler and with host-side
//! writers; it must outlive the transport, usually as a `static`.
//! [`HciTransport`] owns the peer and runs every transfer from task context.

use core::cell::{Cell, RefCell};
use core::marker::PhantomData;
use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use embassy_futures::select::select;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_time::{Instant, Timer};
use embedded_hal_1::delay::DelayNs;

use crate::boot::{self, BootKind};
use crate::config::Config;
use crate::error::Error;
use crate::hci::{patch_adv_own_address, OutboundPacket};
use crate::heartbeat::Heartbeat;
use crate::inbound::InboundBuffer;
use crate::interrupt::{Binding, EventMailbox, Instance, InterruptHandler};
use crate::mode::{Blocking, Mode, NonBlocking};
use crate::peer::{Peer, Transceiver, TxPower};
use crate::queue::WriteQueue;

mod recovery;
mod scheduler;

/// Callback for errors raised outside a caller's `Result`.
pub type ErrorHandler = fn(Error);

/// Receiver of inbound HCI data.
pub trait HciHost {
    /// Offer received bytes. Returns how many were taken; the remainder is
    /// offered again on a later poll before anything new is read.
    fn on_data_received(&mut self, data: &[u8]) -> usize;

    /// The controller was restarted. Queued packets and buffered inbound data
    /// are gone.
    fn on_reset(&mut self) {}
}

/// Lifecycle of the HCI channel.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChannelState {
    Uninitialized = 0,
    Booting = 1,
    Active = 2,
    ErrorRecovering = 3,
    ShuttingDown = 4,
}

impl ChannelState {
    const fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Booting,
            2 => Self::Active,
            3 => Self::ErrorRecovering,
            4 => Self::ShuttingDown,
            _ => Self::Uninitialized,
        }
    }
}

/// Transport counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Stats {
    pub interrupts_seen: u32,
    pub reads: u32,
    pub writes: u32,
    pub heartbeats: u32,
    pub recoveries: u32,
    pub last_error: Option<Error>,
}

/// State shared between the transport, its writers and the interrupt handler.
pub struct State {
    queue: Mutex<CriticalSectionRawMutex, RefCell<WriteQueue>>,
    events: EventMailbox,
    channel: AtomicU8,
    error_handler: Mutex<CriticalSectionRawMutex, Cell<Option<ErrorHandler>>>,
    force_public_adv_address: AtomicBool,
}

impl State {
    pub const fn new() -> Self {
        Self {
            queue: Mutex::new(RefCell::new(WriteQueue::new())),
            events: EventMailbox::new(),
            channel: AtomicU8::new(ChannelState::Uninitialized as u8),
            error_handler: Mutex::new(Cell::new(None)),
            force_public_adv_address: AtomicBool::new(true),
        }
    }

    pub fn events(&self) -> &EventMailbox {
        &self.events
    }

    pub fn channel_state(&self) -> ChannelState {
        ChannelState::from_u8(self.channel.load(Ordering::Acquire))
    }

    pub(crate) fn set_channel_state(&self, state: ChannelState) {
        trace!("HCI channel -> {:?}", state);
        self.channel.store(state as u8, Ordering::Release);
    }

    /// Install the callback that observes asynchronous transport errors.
    pub fn register_error_handler(&self, handler: ErrorHandler) {
        self.error_handler.lock(|h| h.set(Some(handler)));
    }

    /// Log an error and pass it to the registered handler.
    pub(crate) fn report(&self, err: Error) {
        warn!("HCI transport error: {:?}", err);
        if let Some(handler) = self.error_handler.lock(|h| h.get()) {
            handler(err);
        }
    }

    /// Queue one HCI packet for transmission.
    ///
    /// Returns the payload length once the packet is accepted into the
    /// queue. Transmission happens on a later poll.
    pub fn write(&self, packet_type: u8, data: &[u8]) -> Result<u16, Error> {
        if self.channel_state() != ChannelState::Active {
            return Err(Error::ChannelDown);
        }

        let mut packet = OutboundPacket::new(packet_type, data).inspect_err(|&e| self.report(e))?;
        if self.force_public_adv_address.load(Ordering::Relaxed)
            && patch_adv_own_address(packet_type, packet.payload_mut())
        {
            debug!("Forcing public own address in advertising parameters");
        }

        let len = packet.len();
        // Recovery leaves `Active` before it flushes the queue.
        self.queue.lock(|q| {
            if self.channel_state() != ChannelState::Active {
                return Err(Error::ChannelDown);
            }
            q.borrow_mut().enqueue(packet).map_err(|_| {
                debug!("Write queue full");
                Error::TransmitQueueFull
            })
        })?;
        self.events.post_transfer_needed();
        Ok(len)
    }

    pub(crate) fn enqueue(&self, packet: OutboundPacket) -> Result<(), Error> {
        self.with_queue(|q| q.enqueue(packet)).map_err(|_| {
            debug!("Write queue full");
            Error::TransmitQueueFull
        })
    }

    pub(crate) fn with_queue<R>(&self, f: impl FnOnce(&mut WriteQueue) -> R) -> R {
        self.queue.lock(|q| f(&mut q.borrow_mut()))
    }

    /// Packets waiting to be sent.
    pub fn pending_writes(&self) -> usize {
        self.with_queue(|q| q.len())
    }

    pub(crate) fn flush(&self) -> usize {
        let dropped = self.with_queue(|q| q.flush());
        if dropped > 0 {
            warn!("Dropped {} queued HCI packet(s)", dropped);
        }
        dropped
    }
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}

/// Cloneable handle for queueing packets from anywhere in the host stack.
#[derive(Clone, Copy)]
pub struct HciWriter<'d> {
    state: &'d State,
}

impl<'d> HciWriter<'d> {
    pub fn new(state: &'d State) -> Self {
        Self { state }
    }

    /// See [`State::write`].
    pub fn write(&self, packet_type: u8, data: &[u8]) -> Result<u16, Error> {
        self.state.write(packet_type, data)
    }

    pub fn pending(&self) -> usize {
        self.state.pending_writes()
    }
}

impl embedded_io::ErrorType for HciWriter<'_> {
    type Error = Error;
}

/// Each buffer is one complete H4 frame: packet type byte, then payload.
impl embedded_io::Write for HciWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        let (&packet_type, payload) = buf.split_first().ok_or(Error::EmptyFrame)?;
        self.state.write(packet_type, payload)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
enum Direction {
    /// Read of the burst signalled by this IRQ edge count.
    Read(u32),
    Write,
}

/// HCI transport over a half-duplex peer.
///
/// In [`Blocking`] mode every transfer completes inside the peer call and one
/// poll runs transfers back to back. In [`NonBlocking`] mode a transfer may
/// report `WouldBlock`; the transport then waits for the peer's DONE
/// interrupt and runs a single transfer step per poll.
pub struct HciTransport<'d, P, D, M: Mode = Blocking> {
    peer: P,
    delay: D,
    state: &'d State,
    config: Config,
    inbound: InboundBuffer,
    /// Head of the write queue while it is being sent.
    outbound: Option<OutboundPacket>,
    in_flight: Option<Direction>,
    status_ready: bool,
    write_attempts: u8,
    irqs_serviced: u32,
    heartbeat: Heartbeat,
    stats: Stats,
    _mode: PhantomData<M>,
}

impl<'d, P, D> HciTransport<'d, P, D, Blocking>
where
    P: Peer + Transceiver,
    D: DelayNs,
{
    pub fn new(peer: P, delay: D, state: &'d State, config: Config) -> Self {
        Self::new_inner(peer, delay, state, config)
    }

    /// Create a transport on the state of an interrupt-bound [`Instance`].
    pub fn new_bound<T: Instance>(
        peer: P,
        delay: D,
        _irq: impl Binding<InterruptHandler<T>>,
        config: Config,
    ) -> Self {
        Self::new_inner(peer, delay, T::state(), config)
    }

    /// Switch to transfers that complete on the peer's DONE interrupt.
    pub fn into_nonblocking(self) -> HciTransport<'d, P, D, NonBlocking> {
        HciTransport {
            peer: self.peer,
            delay: self.delay,
            state: self.state,
            config: self.config,
            inbound: self.inbound,
            outbound: self.outbound,
            in_flight: self.in_flight,
            status_ready: self.status_ready,
            write_attempts: self.write_attempts,
            irqs_serviced: self.irqs_serviced,
            heartbeat: self.heartbeat,
            stats: self.stats,
            _mode: PhantomData,
        }
    }
}

impl<'d, P, D, M> HciTransport<'d, P, D, M>
where
    P: Peer + Transceiver,
    D: DelayNs,
    M: Mode,
{
    fn new_inner(peer: P, delay: D, state: &'d State, config: Config) -> Self {
        state
            .force_public_adv_address
            .store(config.force_public_adv_address, Ordering::Relaxed);

        Self {
            peer,
            delay,
            state,
            config,
            inbound: InboundBuffer::new(),
            outbound: None,
            in_flight: None,
            status_ready: false,
            write_attempts: 0,
            irqs_serviced: state.events.irqs_seen(),
            heartbeat: Heartbeat::new(config.heartbeat),
            stats: Stats::default(),
            _mode: PhantomData,
        }
    }

    /// Power up and boot the controller, then open the channel.
    pub fn initialize(&mut self) -> Result<(), Error> {
        if self.channel_state() == ChannelState::Active {
            return Ok(());
        }

        info!("Initializing HCI transport");
        self.state.set_channel_state(ChannelState::Booting);
        self.state.flush();
        self.state.events.clear();
        self.reset_transfers();

        match boot::boot(&mut self.peer, &mut self.delay, &self.config, BootKind::Cold) {
            Ok(()) => {
                self.heartbeat.arm();
                self.state.set_channel_state(ChannelState::Active);
                info!("HCI transport ready");
                Ok(())
            }
            Err(e) => {
                self.state.set_channel_state(ChannelState::Uninitialized);
                self.stats.last_error = Some(e);
                self.state.report(e);
                Err(e)
            }
        }
    }

    /// Close the channel and power the controller off. Queued packets are dropped.
    pub fn terminate(&mut self) {
        if self.channel_state() == ChannelState::Uninitialized {
            return;
        }

        info!("Terminating HCI transport");
        self.state.set_channel_state(ChannelState::ShuttingDown);
        boot::power_down(&mut self.peer);
        self.state.flush();
        self.reset_transfers();
        self.heartbeat.disarm();
        self.state.events.clear();
        self.state.set_channel_state(ChannelState::Uninitialized);
    }

    /// See [`State::write`].
    pub fn write(&self, packet_type: u8, data: &[u8]) -> Result<u16, Error> {
        self.state.write(packet_type, data)
    }

    pub fn writer(&self) -> HciWriter<'d> {
        HciWriter::new(self.state)
    }

    pub fn state(&self) -> &'d State {
        self.state
    }

    pub fn channel_state(&self) -> ChannelState {
        self.state.channel_state()
    }

    pub fn register_error_handler(&self, handler: ErrorHandler) {
        self.state.register_error_handler(handler);
    }

    /// Change the TX power now and on every later boot.
    pub fn set_tx_power(&mut self, level: TxPower) -> Result<(), Error> {
        self.ensure_active()?;
        self.peer.set_tx_power(level)?;
        self.config.tx_power = level;
        Ok(())
    }

    /// Allow or forbid controller sleep, now and on every later boot.
    pub fn set_sleep(&mut self, enabled: bool) -> Result<(), Error> {
        self.ensure_active()?;
        self.peer.set_sleep(enabled)?;
        self.config.sleep_enabled = enabled;
        Ok(())
    }

    pub fn stats(&self) -> Stats {
        Stats {
            interrupts_seen: self.state.events.irqs_seen(),
            ..self.stats
        }
    }

    pub fn peer(&self) -> &P {
        &self.peer
    }

    pub fn peer_mut(&mut self) -> &mut P {
        &mut self.peer
    }

    /// Service pending events using the current time.
    pub fn poll(&mut self, host: &mut impl HciHost) {
        self.poll_at(Instant::now(), host);
    }

    /// Run the transport until the channel closes.
    ///
    /// Sleeps until the interrupt handler posts an event or the heartbeat
    /// deadline passes.
    pub async fn run(&mut self, host: &mut impl HciHost) {
        let state = self.state;
        while self.channel_state() == ChannelState::Active {
            self.poll(host);
            if self.channel_state() != ChannelState::Active {
                break;
            }

            match self.heartbeat.deadline() {
                Some(deadline) => {
                    select(state.events.wait(), Timer::at(deadline)).await;
                }
                None => state.events.wait().await,
            }
        }
        info!("HCI transport stopped ({:?})", self.channel_state());
    }

    fn ensure_active(&self) -> Result<(), Error> {
        match self.channel_state() {
            ChannelState::Active => Ok(()),
            _ => Err(Error::ChannelDown),
        }
    }

    /// Forget any partially completed transfer.
    fn reset_transfers(&mut self) {
        self.inbound.reset();
        self.outbound = None;
        self.in_flight = None;
        self.status_ready = false;
        self.write_attempts = 0;
        self.irqs_serviced = self.state.events.irqs_seen();
    }
}
