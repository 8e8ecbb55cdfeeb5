#![no_std]

//! ParkLett Sensor Firmware Library
//!
//! Hardware-independent core of the BLE sensor peripheral, organized into
//! clear architectural layers:
//!
//! - `core`: System infrastructure (configuration, errors, hardware traits)
//! - `sensor`: Sampling trigger, batch aggregation and hysteresis filtering
//! - `ble`: Connection, advertising, service and bonding event handlers
//! - `app`: Event dispatcher owning the application context

pub mod app;
pub mod ble;
pub mod core;
pub mod sensor;
