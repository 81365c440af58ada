//! Interrupt side of the transport.
//!
//! The BLE interrupt handler does no transport work: it latches the peer's
//! interrupt causes into an [`EventMailbox`] and wakes the task that runs
//! [`HciTransport::poll`](crate::transport::HciTransport::poll).
//!
//! ```rust,ignore
//! use apollo3_hci::{bind_interrupts, interrupt, transport::State, Config, HciTransport};
//!
//! static HCI: State = State::new();
//!
//! struct Ble;
//!
//! impl interrupt::Instance for Ble {
//!     fn state() -> &'static State {
//!         &HCI
//!     }
//!
//!     unsafe fn take_interrupts() -> interrupt::Interrupts {
//!         board::ble_take_interrupt_status()
//!     }
//! }
//!
//! bind_interrupts!(struct Irqs {
//!     BLE => interrupt::InterruptHandler<Ble>;
//! });
//!
//! let hci = HciTransport::new_bound::<Ble>(peer, delay, Irqs, Config::default());
//! ```

use core::future::poll_fn;
use core::marker::PhantomData;
use core::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use core::task::Poll;

use embassy_sync::waitqueue::AtomicWaker;

pub use crate::peer::Interrupts;
use crate::transport::State;

/// Software event: more transfer work is pending (`HCI_DRV_TRANSFER_NEEDED`).
pub(crate) const TRANSFER_NEEDED: Interrupts = Interrupts::from_bits(1 << 7);

/// Single-slot mailbox between the interrupt handler and the scheduler.
///
/// Events are accumulated as a bitmask; the scheduler takes them all at
/// once. Rising edges of the peer IRQ are also counted, so the scheduler can
/// tell a new burst from an IRQ level that is still high from the last one.
pub struct EventMailbox {
    pending: AtomicU8,
    irqs_seen: AtomicU32,
    waker: AtomicWaker,
}

impl EventMailbox {
    pub const fn new() -> Self {
        Self {
            pending: AtomicU8::new(0),
            irqs_seen: AtomicU32::new(0),
            waker: AtomicWaker::new(),
        }
    }

    /// Latch interrupt causes. Safe to call from interrupt context.
    pub fn record(&self, causes: Interrupts) {
        if causes.is_empty() {
            return;
        }
        if causes.contains(Interrupts::IRQ) {
            self.irqs_seen.fetch_add(1, Ordering::AcqRel);
        }
        self.pending.fetch_or(causes.bits(), Ordering::AcqRel);
        self.waker.wake();
    }

    /// Ask for another scheduler pass without a hardware event.
    pub(crate) fn post_transfer_needed(&self) {
        self.record(TRANSFER_NEEDED);
    }

    /// Take every pending event.
    pub(crate) fn take(&self) -> Interrupts {
        Interrupts::from_bits(self.pending.swap(0, Ordering::AcqRel))
    }

    pub fn has_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire) != 0
    }

    /// Number of peer IRQ edges seen since the mailbox was created.
    pub fn irqs_seen(&self) -> u32 {
        self.irqs_seen.load(Ordering::Acquire)
    }

    pub(crate) fn clear(&self) {
        self.pending.store(0, Ordering::Release);
    }

    /// Wait until at least one event is pending. Does not take the events.
    pub async fn wait(&self) {
        poll_fn(|cx| {
            self.waker.register(cx.waker());
            if self.has_pending() {
                Poll::Ready(())
            } else {
                Poll::Pending
            }
        })
        .await
    }
}

impl Default for EventMailbox {
    fn default() -> Self {
        Self::new()
    }
}

/// A BLE interface instance the interrupt handler can reach without a driver handle.
pub trait Instance: 'static {
    /// Transport state shared with the scheduler.
    fn state() -> &'static State;

    /// Read and clear the peer's pending interrupt causes.
    ///
    /// # Safety
    ///
    /// Must only be called from the BLE interrupt handler.
    unsafe fn take_interrupts() -> Interrupts;
}

/// Interrupt handler body run from a vector defined by [`bind_interrupts!`].
pub trait Handler {
    /// # Safety
    ///
    /// Must only be called from the interrupt vector it is bound to.
    unsafe fn on_interrupt();
}

/// Proof that handler `H` is installed on an interrupt vector.
///
/// Implemented by the struct [`bind_interrupts!`] defines; drivers take it
/// as `_irq: impl Binding<H>`.
///
/// # Safety
///
/// Only implement this when the vector really calls `H::on_interrupt`.
pub unsafe trait Binding<H: Handler> {}

/// BLE interrupt handler.
pub struct InterruptHandler<T: Instance> {
    _phantom: PhantomData<T>,
}

impl<T: Instance> Handler for InterruptHandler<T> {
    unsafe fn on_interrupt() {
        let causes = T::take_interrupts();
        if causes.is_empty() {
            return;
        }
        trace!("BLE irq: causes=0x{:02X}", causes.bits());
        T::state().events().record(causes);
    }
}

/// Bind interrupt vectors to handlers.
///
/// Defines each vector function (normally `BLE`) and a unit struct that
/// implements [`Binding`] for every handler it installs.
#[macro_export]
macro_rules! bind_interrupts {
    ($vis:vis struct $name:ident {
        $(
            $irq:ident => $($handler:ty),*;
        )*
    }) => {
        #[derive(Copy, Clone)]
        $vis struct $name;

        $(
            #[allow(non_snake_case)]
            #[no_mangle]
            unsafe extern "C" fn $irq() {
                $(
                    <$handler as $crate::interrupt::Handler>::on_interrupt();
                )*
            }

            $(
                unsafe impl $crate::interrupt::Binding<$handler> for $name {}
            )*
        )*
    };
}
