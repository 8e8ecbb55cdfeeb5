//! Hardware Abstraction
//!
//! Narrow interfaces between the event-driven core and the platform: the
//! SoftDevice, the timer/PPI routing fabric, the SAADC batch sampler, the
//! sensor power pin, the battery monitor and the bond store. The firmware
//! binary implements them on nRF52; the tests implement recording mocks.

use embassy_time::Duration;

use crate::ble::bonding::BondRecord;
use crate::core::config::{AdvertisingConfig, ConnParams};
use crate::core::error::{BondError, HalError, StackError};

/// SoftDevice connection handle.
pub type ConnHandle = u16;

/// Raw analog sample as produced by the SAADC (8-bit resolution).
pub type RawSample = i16;

/// Identifier of one timer-compare → sample-task routing slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub struct ChannelId(pub u8);

/// HCI disconnect reasons used by this firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
#[repr(u8)]
pub enum HciReason {
    RemoteUserTerminated = 0x13,
    ConnIntervalUnacceptable = 0x3B,
}

/// The BLE stack as seen from the application core.
pub trait BleStack {
    /// Begin connectable advertising with the given parameters.
    fn start_advertising(&mut self, config: &AdvertisingConfig) -> Result<(), StackError>;

    /// Send a notification on the sensor characteristic.
    fn notify(&mut self, handle: ConnHandle, payload: &[u8]) -> Result<(), StackError>;

    /// Terminate the link.
    fn disconnect(&mut self, handle: ConnHandle, reason: HciReason) -> Result<(), StackError>;

    /// Ask the central for new connection parameters.
    fn request_conn_params(&mut self, handle: ConnHandle, params: &ConnParams) -> Result<(), StackError>;

    /// Arm the single connection parameter timer, replacing any pending one.
    fn start_conn_params_timer(&mut self, after: Duration);

    /// Disarm the connection parameter timer.
    fn stop_conn_params_timer(&mut self);
}

/// Timer + event routing fabric driving the sampler without CPU involvement.
pub trait TriggerFabric {
    /// Configure the periodic timer and allocate a routing channel from its
    /// compare event to the sample task.
    fn allocate(&mut self, period_ticks: u32) -> Result<ChannelId, HalError>;

    fn enable(&mut self, channel: ChannelId) -> Result<(), HalError>;

    fn disable(&mut self, channel: ChannelId) -> Result<(), HalError>;
}

/// Batch conversion side of the SAADC driver.
pub trait BatchSampler {
    /// Hand the buffer back to the hardware for the next batch.
    fn rearm(&mut self) -> Result<(), HalError>;
}

/// External sensor power switch.
pub trait SensorPower {
    fn set_powered(&mut self, on: bool);
}

/// Battery level source for the low-battery warning.
pub trait BatteryMonitor {
    fn is_low(&mut self) -> bool;
}

/// Persistent bond storage.
pub trait BondStore {
    /// Delete every stored bond.
    fn erase_all(&mut self) -> Result<(), BondError>;

    /// Add or replace the bond of one peer.
    fn store(&mut self, record: BondRecord) -> Result<(), BondError>;
}

/// Battery monitor used while battery sampling is not wired up.
#[derive(Debug, Default, Clone, Copy)]
pub struct NeverLow;

impl BatteryMonitor for NeverLow {
    fn is_low(&mut self) -> bool {
        false
    }
}
