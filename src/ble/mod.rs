//! BLE Event Handling
//!
//! The dispatch stages the application runs for every stack event, in
//! order: connection state bookkeeping, connection parameter negotiation,
//! local link handling, the sensor service, advertising and bonding.

pub mod advertising;
pub mod bonding;
pub mod conn_params;
pub mod conn_state;
pub mod events;
pub mod link;
pub mod service;
