#![cfg_attr(not(test), no_std)]
#![doc = include_str!("../README.md")]
#![allow(unsafe_op_in_unsafe_fn)]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod boot;
pub mod config;
pub mod error;
pub mod hci;
mod heartbeat;
mod inbound;
pub mod interrupt;
pub mod peer;
pub mod queue;
pub mod transport;
mod wake;

#[cfg(test)]
mod mock;

pub use config::Config;
pub use error::Error;
pub use peer::{Interrupts, Peer, PeerError, Transceiver, TxPower};
pub use transport::{ChannelState, HciHost, HciTransport, HciWriter, State, Stats};

/// Transfer modes of the transport.
pub mod mode {
    pub(crate) trait SealedMode {
        /// Transfers complete inside the peer call.
        const BLOCKING: bool;
    }

    /// Transfer mode of an [`HciTransport`](crate::HciTransport).
    #[allow(private_bounds)]
    pub trait Mode: SealedMode {}

    macro_rules! impl_mode {
        ($name:ident, $blocking:literal) => {
            impl SealedMode for $name {
                const BLOCKING: bool = $blocking;
            }
            impl Mode for $name {}
        };
    }

    /// Every transfer completes inside the peer call.
    pub struct Blocking;
    /// Transfers may complete later, signalled by the DONE interrupt.
    pub struct NonBlocking;

    impl_mode!(Blocking, true);
    impl_mode!(NonBlocking, false);
}
