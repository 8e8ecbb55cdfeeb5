//! Sensor Pipeline
//!
//! Timer-triggered analog sampling, batch averaging and the hysteresis
//! filter deciding which readings are worth a notification.

pub mod aggregator;
pub mod filter;
pub mod trigger;
