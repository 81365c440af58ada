//! Transport configuration.

use embassy_time::Duration;

use crate::peer::TxPower;

/// HCI transport configuration passed when creating the transport.
#[derive(Debug, Clone, Copy)]
#[non_exhaustive]
pub struct Config {
    /// Idle period after which a heartbeat command is sent. `None` disables it.
    pub heartbeat: Option<Duration>,

    /// Boot attempts allowed while the 32 kHz clock is unstable (`HCI_DRV_MAX_XTAL_RETRIES`).
    pub xtal_retries: u8,

    /// Delay between clock-unstable boot attempts, in milliseconds.
    pub xtal_retry_delay_ms: u32,

    /// Extra settling delay before the first boot after power-up, in milliseconds.
    pub cold_boot_delay_ms: u32,

    /// Failed write attempts tolerated for one packet before recovery.
    pub write_retries: u8,

    /// Transactions one blocking `poll` may perform (`HCI_DRV_MAX_HCI_TRANSACTIONS`).
    pub max_transactions_per_poll: usize,

    /// How long the IRQ line may stay high after a completed read, in microseconds.
    pub irq_timeout_us: u32,

    /// Radio TX power applied at every boot.
    pub tx_power: TxPower,

    /// Allow the controller to sleep between transactions.
    pub sleep_enabled: bool,

    /// Clear the own-address type of LE Set Advertising Parameters commands.
    pub force_public_adv_address: bool,
}

impl Config {
    pub const fn new() -> Self {
        Self {
            heartbeat: Some(Duration::from_millis(10_000)),
            xtal_retries: 10,
            xtal_retry_delay_ms: 1_000,
            cold_boot_delay_ms: 500,
            write_retries: 3,
            max_transactions_per_poll: 16,
            irq_timeout_us: 2_000,
            tx_power: TxPower::PLUS_3_DBM,
            sleep_enabled: false,
            force_public_adv_address: true,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
