//! Core System Infrastructure
//!
//! Provides fundamental system services that are not BLE-specific.
//! This includes configuration, the error taxonomy and the hardware
//! abstraction traits the rest of the firmware is written against.

pub mod config;
pub mod error;
pub mod hal;
