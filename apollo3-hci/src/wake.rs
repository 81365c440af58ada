//! Wake-line arbitration.

use crate::peer::Peer;

/// Outcome of one arbitration pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) enum Wake {
    /// Nothing to send; wake released.
    Released,
    /// Work is queued but the peer is busy or about to send.
    Deferred,
    /// Wake asserted.
    Asserted,
    /// Wake was asserted while the peer raised IRQ, and released again.
    Raced,
}

/// Assert wake exactly when there is outbound work and the peer is neither
/// busy nor signalling data of its own.
///
/// Asserting wake and the peer raising IRQ can happen at the same time, so
/// IRQ is sampled again after the assert and a losing assert is withdrawn.
/// Runs with interrupts masked so the peer interrupt cannot be serviced
/// between the two samples.
pub(crate) fn arbitrate<P: Peer>(peer: &mut P, has_work: bool) -> Wake {
    critical_section::with(|_| {
        if !has_work {
            peer.set_wake(false);
            return Wake::Released;
        }

        if peer.busy_line() || peer.irq_line() {
            return Wake::Deferred;
        }

        peer.set_wake(true);
        if peer.irq_line() {
            peer.set_wake(false);
            return Wake::Raced;
        }

        Wake::Asserted
    })
}
