//! BLE Event Model
//!
//! Stack notifications are translated by the platform into [`BleEvent`]s
//! and queued, together with sensor readings and timer expiries, as
//! [`AppEvent`]s for the single application task. Every dispatch stage
//! implements [`EventHandler`].

use defmt::Format;

use crate::ble::bonding::BondRecord;
use crate::core::config::ConnParams;
use crate::core::error::FirmwareError;
use crate::core::hal::ConnHandle;

/// GATT attribute a central wrote to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
pub enum WriteTarget {
    /// Control characteristic value
    Control,
    /// Sensor characteristic CCCD (notification subscription)
    SensorCccd { notifications: bool },
}

/// Events delivered by the BLE stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
pub enum BleEvent {
    Connected {
        conn_handle: ConnHandle,
        params: ConnParams,
    },
    Disconnected {
        conn_handle: ConnHandle,
        reason: u8,
    },
    GattsWrite {
        conn_handle: ConnHandle,
        target: WriteTarget,
    },
    ConnParamsUpdated {
        conn_handle: ConnHandle,
        params: ConnParams,
    },
    /// Advertising stopped after its timeout without a connection
    AdvertisingTimeout,
    SecurityUpdated {
        conn_handle: ConnHandle,
        encrypted: bool,
    },
    Bonded {
        conn_handle: ConnHandle,
        record: BondRecord,
    },
}

/// Everything the application task consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
pub enum AppEvent {
    Ble(BleEvent),
    /// Batch mean from the sample aggregator
    Reading(u16),
    /// The connection parameter timer expired
    ConnParamsTimeout,
}

impl From<BleEvent> for AppEvent {
    fn from(event: BleEvent) -> Self {
        AppEvent::Ble(event)
    }
}

/// One stage of the BLE event dispatcher.
pub trait EventHandler<C> {
    fn on_ble_event(&mut self, event: &BleEvent, ctx: &mut C) -> Result<(), FirmwareError>;
}
