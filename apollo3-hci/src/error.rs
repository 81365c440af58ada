//! Transport error type.

use crate::boot::BootStage;
use crate::peer::PeerError;

/// Errors surfaced by the HCI transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum Error {
    /// The write queue was full; the packet was dropped.
    TransmitQueueFull,
    /// A packet exceeded the maximum HCI packet size.
    PacketTooLarge {
        /// Length of the offending packet (bytes).
        len: usize,
        /// Largest accepted length (bytes).
        max: usize,
    },
    /// A transfer primitive reported a hardware fault.
    HardwareFault(PeerError),
    /// The peer could not be booted.
    BootFailure {
        /// Stage of the boot sequence that failed.
        stage: BootStage,
        /// Status returned by the peer.
        cause: PeerError,
    },
    /// The blocking scheduler hit its per-poll transaction cap with work left.
    TooManySuccessiveTransactions,
    /// An H4 frame without a packet indicator.
    EmptyFrame,
    /// The channel is not active.
    ChannelDown,
}

impl Error {
    /// `true` if the error invalidates the channel and requires a full restart.
    pub const fn needs_recovery(&self) -> bool {
        matches!(
            self,
            Self::HardwareFault(_) | Self::PacketTooLarge { .. } | Self::TooManySuccessiveTransactions
        )
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::TransmitQueueFull => f.write_str("transmit queue full"),
            Self::PacketTooLarge { len, max } => {
                write!(f, "HCI packet too large: {} bytes (max {})", len, max)
            }
            Self::HardwareFault(e) => write!(f, "hardware fault: {}", e),
            Self::BootFailure { stage, cause } => {
                write!(f, "boot failed in {:?}: {}", stage, cause)
            }
            Self::TooManySuccessiveTransactions => f.write_str("too many successive HCI transactions"),
            Self::EmptyFrame => f.write_str("empty HCI frame"),
            Self::ChannelDown => f.write_str("HCI channel not active"),
        }
    }
}

impl core::error::Error for Error {}

impl embedded_io::Error for Error {
    fn kind(&self) -> embedded_io::ErrorKind {
        use embedded_io::ErrorKind;

        match self {
            Self::TransmitQueueFull => ErrorKind::OutOfMemory,
            Self::PacketTooLarge { .. } => ErrorKind::InvalidInput,
            Self::HardwareFault(_) => ErrorKind::Other,
            Self::BootFailure { .. } => ErrorKind::NotConnected,
            Self::TooManySuccessiveTransactions => ErrorKind::TimedOut,
            Self::EmptyFrame => ErrorKind::InvalidInput,
            Self::ChannelDown => ErrorKind::NotConnected,
        }
    }
}

impl From<PeerError> for Error {
    fn from(e: PeerError) -> Self {
        Self::HardwareFault(e)
    }
}
