//! Application-wide constants and runtime configuration.
//!
//! Timing parameters, thresholds and protocol constants live here so they
//! can be tuned in one place. Values the tests need to vary are grouped in
//! [`FirmwareConfig`].

use defmt::Format;
use embassy_time::Duration;

// Device identity

/// Full device name used in the advertising payload and GAP.
pub const DEVICE_NAME: &str = "ParkLett";

/// Sensor service UUID f3641400-00b0-4240-ba50-05ca45bf8abc, little-endian
/// as it appears in the scan response.
pub const SENSOR_SERVICE_UUID_LE: [u8; 16] = [
    0xbc, 0x8a, 0xbf, 0x45, 0xca, 0x05, 0x50, 0xba, 0x40, 0x42, 0xb0, 0x00, 0x00, 0x14, 0x64, 0xf3,
];

// Advertising

/// Slow advertising interval (0.625 ms units). 480 = 300 ms.
pub const ADV_SLOW_INTERVAL: u32 = 480;

/// Slow advertising timeout (seconds).
pub const ADV_SLOW_TIMEOUT_SECS: u16 = 20;

// Connection parameters

/// Minimum acceptable connection interval (1.25 ms units). 16 = 20 ms.
pub const MIN_CONN_INTERVAL: u16 = 16;

/// Maximum acceptable connection interval (1.25 ms units). 60 = 75 ms.
pub const MAX_CONN_INTERVAL: u16 = 60;

/// Slave latency.
pub const SLAVE_LATENCY: u16 = 0;

/// Supervision timeout (10 ms units). 400 = 4 s.
pub const CONN_SUP_TIMEOUT: u16 = 400;

/// Delay from connect to the first parameter update request.
pub const FIRST_CONN_PARAMS_UPDATE_DELAY: Duration = Duration::from_secs(5);

/// Delay between subsequent parameter update requests.
pub const NEXT_CONN_PARAMS_UPDATE_DELAY: Duration = Duration::from_secs(30);

/// Update requests sent before negotiation is declared failed.
pub const MAX_CONN_PARAMS_UPDATE_COUNT: u8 = 3;

// Sampling

/// Samples per conversion batch.
pub const SAMPLES_IN_BUFFER: usize = 30;

/// Sampling timer frequency (Hz).
pub const SAMPLE_TIMER_FREQUENCY_HZ: u32 = 1_000_000;

/// Sampling period in timer ticks. 6000 ticks at 1 MHz = 6 ms.
pub const SAMPLE_PERIOD_TICKS: u32 = 6 * SAMPLE_TIMER_FREQUENCY_HZ / 1000;

// Filtering

/// Readings above this value are out of range and dropped.
pub const MAX_VALID_READING: u16 = 254;

/// Readings below this value reset the held peak.
pub const LOW_READING_THRESHOLD: u16 = 25;

/// Payload sent when the battery monitor reports a low battery.
pub const BATTERY_LOW_WARNING: u8 = b'E';

// Bond storage

/// Maximum number of bonded peers kept in the bond table.
pub const MAX_BONDED_PEERS: usize = 4;

/// Flash page size on nRF52832.
pub const FLASH_PAGE_SIZE: u32 = 4096;

/// First flash address of the bond store (last 16 KB of flash).
pub const BOND_STORAGE_START: u32 = 0x0007_C000;

/// End address (exclusive) of the bond store.
pub const BOND_STORAGE_END: u32 = BOND_STORAGE_START + 4 * FLASH_PAGE_SIZE;

/// Connection parameters in SoftDevice units (matches `ble_gap_conn_params_t`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
pub struct ConnParams {
    /// Minimum connection interval (1.25 ms units)
    pub min_conn_interval: u16,
    /// Maximum connection interval (1.25 ms units)
    pub max_conn_interval: u16,
    /// Slave latency
    pub slave_latency: u16,
    /// Supervision timeout (10 ms units)
    pub conn_sup_timeout: u16,
}

impl ConnParams {
    /// Preferred peripheral connection parameters published at boot.
    pub const PREFERRED: Self = Self {
        min_conn_interval: MIN_CONN_INTERVAL,
        max_conn_interval: MAX_CONN_INTERVAL,
        slave_latency: SLAVE_LATENCY,
        conn_sup_timeout: CONN_SUP_TIMEOUT,
    };
}

impl Default for ConnParams {
    fn default() -> Self {
        Self::PREFERRED
    }
}

/// Advertising mode. Fast advertising is disabled in this product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
pub enum AdvMode {
    Idle,
    Slow,
}

/// Advertising configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
pub struct AdvertisingConfig {
    /// Advertising interval (0.625 ms units)
    pub interval: u32,
    /// Advertising timeout (seconds)
    pub timeout_secs: u16,
}

impl AdvertisingConfig {
    /// Timeout in the 10 ms units the SoftDevice expects.
    pub const fn timeout_10ms(&self) -> u16 {
        self.timeout_secs * 100
    }
}

impl Default for AdvertisingConfig {
    fn default() -> Self {
        Self {
            interval: ADV_SLOW_INTERVAL,
            timeout_secs: ADV_SLOW_TIMEOUT_SECS,
        }
    }
}

/// Connection parameter negotiation configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
pub struct ConnParamsConfig {
    pub preferred: ConnParams,
    pub first_update_delay: Duration,
    pub next_update_delay: Duration,
    pub max_update_count: u8,
}

impl Default for ConnParamsConfig {
    fn default() -> Self {
        Self {
            preferred: ConnParams::PREFERRED,
            first_update_delay: FIRST_CONN_PARAMS_UPDATE_DELAY,
            next_update_delay: NEXT_CONN_PARAMS_UPDATE_DELAY,
            max_update_count: MAX_CONN_PARAMS_UPDATE_COUNT,
        }
    }
}

/// IO capabilities advertised during pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
pub enum IoCaps {
    None,
    DisplayOnly,
    KeyboardOnly,
    DisplayYesNo,
    KeyboardDisplay,
}

/// Keys distributed by one side of the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
pub struct KeyDistribution {
    pub enc: bool,
    pub id: bool,
}

/// Security parameters used for all security procedures. Fixed at boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
pub struct SecurityPolicy {
    pub bond: bool,
    pub mitm: bool,
    pub io_caps: IoCaps,
    pub oob: bool,
    pub min_key_size: u8,
    pub max_key_size: u8,
    pub kdist_peripheral: KeyDistribution,
    pub kdist_central: KeyDistribution,
}

impl SecurityPolicy {
    pub const DEFAULT: Self = Self {
        bond: true,
        mitm: false,
        io_caps: IoCaps::None,
        oob: false,
        min_key_size: 7,
        max_key_size: 16,
        kdist_peripheral: KeyDistribution { enc: true, id: true },
        kdist_central: KeyDistribution { enc: true, id: true },
    };
}

impl Default for SecurityPolicy {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Runtime configuration the application is built from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
pub struct FirmwareConfig {
    pub advertising: AdvertisingConfig,
    pub conn_params: ConnParamsConfig,
    pub security: SecurityPolicy,
    /// Delete all stored bonds during boot
    pub erase_bonds_on_boot: bool,
}

impl Default for FirmwareConfig {
    fn default() -> Self {
        Self {
            advertising: AdvertisingConfig::default(),
            conn_params: ConnParamsConfig::default(),
            security: SecurityPolicy::DEFAULT,
            erase_bonds_on_boot: false,
        }
    }
}
