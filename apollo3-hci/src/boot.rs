//! Controller boot sequence.
//!
//! PowerOn → ConfigureInterface → Boot → EnableInterrupts. A boot that fails
//! because the 32 kHz clock has not stabilised powers the controller down and
//! starts over after a fixed delay, up to [`Config::xtal_retries`] attempts.
//! Any other failure ends the sequence. The same sequence runs at cold start
//! and during error recovery; only a cold start waits for the extra settling
//! delay.

use embedded_hal_1::delay::DelayNs;

use crate::config::Config;
use crate::error::Error;
use crate::peer::{Interrupts, Peer, PeerError};

/// Stage of the boot sequence, reported with [`Error::BootFailure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BootStage {
    PowerOn,
    ConfigureInterface,
    Boot,
    EnableInterrupts,
}

/// Whether the controller is coming up for the first time since power-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BootKind {
    Cold,
    Warm,
}

/// Run the full boot sequence.
pub(crate) fn boot<P, D>(peer: &mut P, delay: &mut D, config: &Config, kind: BootKind) -> Result<(), Error>
where
    P: Peer,
    D: DelayNs,
{
    info!("Booting BLE controller ({:?})", kind);

    let mut attempts: u8 = 0;
    loop {
        attempts = attempts.saturating_add(1);

        debug!("Step 1: Powering on controller (attempt {})", attempts);
        peer.power(true).map_err(|cause| fail(BootStage::PowerOn, cause))?;

        debug!("Step 2: Configuring host interface");
        if let Err(cause) = peer.configure() {
            power_down(peer);
            return Err(fail(BootStage::ConfigureInterface, cause));
        }

        if kind == BootKind::Cold {
            delay.delay_ms(config.cold_boot_delay_ms);
        }

        debug!("Step 3: Starting controller");
        match peer.boot() {
            Ok(()) => break,
            Err(PeerError::ClockUnstable) if attempts < config.xtal_retries => {
                warn!(
                    "32k clock unstable, retrying boot ({}/{})",
                    attempts, config.xtal_retries
                );
                power_down(peer);
                delay.delay_ms(config.xtal_retry_delay_ms);
            }
            Err(cause) => {
                power_down(peer);
                return Err(fail(BootStage::Boot, cause));
            }
        }
    }

    debug!("Step 4: Enabling interrupts");
    enable(peer, config).map_err(|cause| {
        power_down(peer);
        fail(BootStage::EnableInterrupts, cause)
    })?;

    info!("BLE controller booted after {} attempt(s)", attempts);
    Ok(())
}

fn enable<P: Peer>(peer: &mut P, config: &Config) -> Result<(), PeerError> {
    peer.set_tx_power(config.tx_power)?;
    peer.set_sleep(config.sleep_enabled)?;
    peer.clear_interrupts(Interrupts::ALL);
    peer.enable_interrupts(Interrupts::ALL);
    Ok(())
}

/// Quiesce and power off the controller. Errors are logged only; the
/// controller is being abandoned either way.
pub(crate) fn power_down<P: Peer>(peer: &mut P) {
    peer.disable_interrupts(Interrupts::ALL);
    peer.set_wake(false);
    if let Err(e) = peer.power(false) {
        warn!("Power-down failed: {:?}", e);
    }
}

fn fail(stage: BootStage, cause: PeerError) -> Error {
    error!("Boot failed at {:?}: {:?}", stage, cause);
    Error::BootFailure { stage, cause }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockDelay, MockPeer, Op};

    fn config() -> Config {
        Config {
            xtal_retries: 3,
            xtal_retry_delay_ms: 100,
            cold_boot_delay_ms: 500,
            ..Config::new()
        }
    }

    #[test]
    fn cold_boot_waits_and_enables_interrupts() {
        let mut peer = MockPeer::detached();
        let mut delay = MockDelay::default();

        boot(&mut peer, &mut delay, &config(), BootKind::Cold).unwrap();

        assert_eq!(delay.total_ms(), 500);
        assert_eq!(peer.interrupts_enabled, Interrupts::ALL);
        assert!(peer.powered);
        assert_eq!(
            peer.ops,
            [Op::PowerOn, Op::Configure, Op::Boot, Op::TxPower(0x0F), Op::Sleep(false)]
        );
    }

    #[test]
    fn warm_boot_skips_settling_delay() {
        let mut peer = MockPeer::detached();
        let mut delay = MockDelay::default();

        boot(&mut peer, &mut delay, &config(), BootKind::Warm).unwrap();
        assert_eq!(delay.total_ms(), 0);
    }

    #[test]
    fn unstable_clock_is_retried() {
        let mut peer = MockPeer::detached();
        peer.boot_results.push_back(Err(PeerError::ClockUnstable));
        peer.boot_results.push_back(Err(PeerError::ClockUnstable));
        let mut delay = MockDelay::default();

        boot(&mut peer, &mut delay, &config(), BootKind::Warm).unwrap();

        assert_eq!(peer.count(Op::Boot), 3);
        assert_eq!(peer.count(Op::PowerOff), 2);
        assert_eq!(delay.total_ms(), 200);
        assert!(peer.powered);
    }

    #[test]
    fn unstable_clock_gives_up_after_retries() {
        let mut peer = MockPeer::detached();
        for _ in 0..5 {
            peer.boot_results.push_back(Err(PeerError::ClockUnstable));
        }
        let mut delay = MockDelay::default();

        let err = boot(&mut peer, &mut delay, &config(), BootKind::Warm).unwrap_err();

        assert_eq!(
            err,
            Error::BootFailure {
                stage: BootStage::Boot,
                cause: PeerError::ClockUnstable
            }
        );
        assert_eq!(peer.count(Op::Boot), 3);
        assert!(!peer.powered);
    }

    #[test]
    fn other_boot_failure_is_terminal() {
        let mut peer = MockPeer::detached();
        peer.boot_results.push_back(Err(PeerError::Status(0x08)));
        let mut delay = MockDelay::default();

        let err = boot(&mut peer, &mut delay, &config(), BootKind::Cold).unwrap_err();

        assert_eq!(
            err,
            Error::BootFailure {
                stage: BootStage::Boot,
                cause: PeerError::Status(0x08)
            }
        );
        assert_eq!(peer.count(Op::Boot), 1);
        assert!(!peer.powered);
    }

    #[test]
    fn configure_failure_reports_stage() {
        let mut peer = MockPeer::detached();
        peer.configure_result = Err(PeerError::Bus);
        let mut delay = MockDelay::default();

        let err = boot(&mut peer, &mut delay, &config(), BootKind::Warm).unwrap_err();
        assert_eq!(
            err,
            Error::BootFailure {
                stage: BootStage::ConfigureInterface,
                cause: PeerError::Bus
            }
        );
        assert_eq!(peer.count(Op::Boot), 0);
    }
}
