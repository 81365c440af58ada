//! Capabilities the transport needs from the BLE controller ("peer").
//!
//! The chip-level HAL (power control, SPI-like transfers, wake/status lines)
//! lives outside this crate. A board crate implements [`Peer`] and
//! [`Transceiver`] on top of it and hands the result to
//! [`HciTransport`](crate::transport::HciTransport).

use core::ops::{BitOr, BitOrAssign};

/// Status reported by a failed peer primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum PeerError {
    /// The peer is not ready for the request; it may be retried.
    NotReady,
    /// The 32 kHz clock did not stabilise during boot.
    ClockUnstable,
    /// Bus or FIFO error on the host interface.
    Bus,
    /// The peer stopped responding.
    Unresponsive,
    /// The peer kept its IRQ line asserted after a completed read.
    IrqStuck,
    /// Vendor status code without a dedicated variant.
    Status(u32),
}

impl PeerError {
    /// `true` for statuses that describe a transient condition rather than a fault.
    pub const fn is_transient(self) -> bool {
        matches!(self, Self::NotReady)
    }
}

impl core::fmt::Display for PeerError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotReady => f.write_str("peer not ready"),
            Self::ClockUnstable => f.write_str("32k clock unstable"),
            Self::Bus => f.write_str("bus error"),
            Self::Unresponsive => f.write_str("peer unresponsive"),
            Self::IrqStuck => f.write_str("IRQ line stuck high"),
            Self::Status(code) => write!(f, "peer status 0x{:08X}", code),
        }
    }
}

/// Peer interrupt causes, as latched by the interrupt handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Interrupts(u8);

impl Interrupts {
    pub const NONE: Self = Self(0);
    /// Peer has data for the host (BLECIRQ).
    pub const IRQ: Self = Self(1 << 0);
    /// Peer is ready to accept a write (BLECSSTAT).
    pub const STATUS: Self = Self(1 << 1);
    /// A non-blocking transfer completed (CMDCMP).
    pub const DONE: Self = Self(1 << 2);
    /// Bus or FIFO error raised by the interface.
    pub const FAULT: Self = Self(1 << 3);
    /// Every hardware source the transport enables.
    pub const ALL: Self = Self(0x0F);

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Interrupts {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for Interrupts {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Radio TX power register value (`am_hal_ble_tx_power_set`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TxPower(pub u8);

impl TxPower {
    /// -10 dBm
    pub const MINUS_10_DBM: Self = Self(0x04);
    /// 0 dBm
    pub const ZERO_DBM: Self = Self(0x08);
    /// +3 dBm, the controller's maximum.
    pub const PLUS_3_DBM: Self = Self(0x0F);
}

impl Default for TxPower {
    fn default() -> Self {
        Self::PLUS_3_DBM
    }
}

/// Lifecycle, line and interrupt control of the peer.
///
/// Line reads must be cheap: the wake arbiter samples them inside a critical section.
pub trait Peer {
    /// Switch peer power on or off. Powering off also deinitialises the interface.
    fn power(&mut self, on: bool) -> Result<(), PeerError>;

    /// Apply the default interface configuration (clocks, FIFO thresholds, SPI mode).
    fn configure(&mut self) -> Result<(), PeerError>;

    /// Load patches and start the controller.
    ///
    /// Returns [`PeerError::ClockUnstable`] when the 32 kHz clock failed to settle;
    /// that is the only retryable boot failure.
    fn boot(&mut self) -> Result<(), PeerError>;

    /// Drive the host-to-peer wake line.
    fn set_wake(&mut self, asserted: bool);

    /// Level of the peer's IRQ (data ready) line.
    fn irq_line(&self) -> bool;

    /// Level of the peer's busy line.
    fn busy_line(&self) -> bool;

    fn enable_interrupts(&mut self, which: Interrupts);

    fn disable_interrupts(&mut self, which: Interrupts);

    fn clear_interrupts(&mut self, which: Interrupts);

    fn set_tx_power(&mut self, level: TxPower) -> Result<(), PeerError>;

    fn set_sleep(&mut self, enabled: bool) -> Result<(), PeerError>;
}

/// Half-duplex HCI transfers.
///
/// Both blocking and interrupt-driven peers expose the same `nb`-style surface:
///
/// - A blocking peer performs the whole transfer inside the call. It returns
///   `WouldBlock` only when the peer could not take part in a transfer yet.
/// - A non-blocking peer starts the transfer and returns `WouldBlock`. Once the
///   completion interrupt ([`Interrupts::DONE`]) fires, the next call with the
///   same arguments returns the outcome without starting another transfer.
pub trait Transceiver {
    /// Read one burst from the peer into `buf`.
    ///
    /// Returns the length the peer declared for the burst. A value larger than
    /// `buf.len()` means the peer tried to send more than fits; only
    /// `buf.len()` bytes were copied.
    fn read(&mut self, buf: &mut [u8]) -> nb::Result<usize, PeerError>;

    /// Write one complete H4 frame (packet type byte followed by the payload).
    fn write(&mut self, frame: &[u8]) -> nb::Result<(), PeerError>;
}
