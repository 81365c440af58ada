//! Error recovery: restart the controller after a channel fault.

use embedded_hal_1::delay::DelayNs;

use super::{ChannelState, HciHost, HciTransport};
use crate::boot::{self, BootKind};
use crate::error::Error;
use crate::mode::Mode;
use crate::peer::{Peer, Transceiver};

impl<'d, P, D, M> HciTransport<'d, P, D, M>
where
    P: Peer + Transceiver,
    D: DelayNs,
    M: Mode,
{
    /// Report `err` and restart the channel if it cannot continue.
    pub(super) fn fail(&mut self, err: Error, host: &mut impl HciHost) {
        self.stats.last_error = Some(err);
        self.state.report(err);
        if err.needs_recovery() {
            self.recover(host);
        }
    }

    /// Power-cycle the controller, drop every queued and buffered packet and
    /// boot again. The host is told through [`HciHost::on_reset`].
    fn recover(&mut self, host: &mut impl HciHost) {
        warn!("Restarting BLE controller");
        self.state.set_channel_state(ChannelState::ErrorRecovering);
        self.stats.recoveries += 1;

        boot::power_down(&mut self.peer);
        self.state.events.clear();
        self.reset_transfers();

        let booted = boot::boot(&mut self.peer, &mut self.delay, &self.config, BootKind::Warm);
        self.state.flush();
        host.on_reset();

        match booted {
            Ok(()) => {
                self.heartbeat.arm();
                self.state.set_channel_state(ChannelState::Active);
                info!("BLE controller restarted");
            }
            Err(e) => {
                self.heartbeat.disarm();
                self.state.set_channel_state(ChannelState::Uninitialized);
                self.stats.last_error = Some(e);
                self.state.report(e);
            }
        }
    }
}
