//! Connection State Bookkeeping
//!
//! Status flags of the single peripheral link, updated first for every
//! stack event so later stages observe a consistent view.

use defmt::debug;

use crate::ble::events::{BleEvent, EventHandler};
use crate::core::error::FirmwareError;
use crate::core::hal::ConnHandle;

/// Handle value meaning "no link".
pub const CONN_HANDLE_INVALID: ConnHandle = 0xFFFF;

// Status flag bit positions
pub const FLAG_CONNECTED: u8 = 0x01;
pub const FLAG_ENCRYPTED: u8 = 0x02;
pub const FLAG_BONDED: u8 = 0x04;

#[derive(Debug, Clone)]
pub struct ConnStateTracker {
    conn_handle: ConnHandle,
    status_flags: u8,
}

impl Default for ConnStateTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnStateTracker {
    pub const fn new() -> Self {
        Self {
            conn_handle: CONN_HANDLE_INVALID,
            status_flags: 0,
        }
    }

    pub fn is_connected(&self) -> bool {
        (self.status_flags & FLAG_CONNECTED) != 0
    }

    pub fn is_encrypted(&self) -> bool {
        (self.status_flags & FLAG_ENCRYPTED) != 0
    }

    pub fn is_bonded(&self) -> bool {
        (self.status_flags & FLAG_BONDED) != 0
    }

    pub fn conn_handle(&self) -> ConnHandle {
        self.conn_handle
    }

    fn set_flag(&mut self, flag: u8, on: bool) {
        if on {
            self.status_flags |= flag;
        } else {
            self.status_flags &= !flag;
        }
    }
}

impl<C> EventHandler<C> for ConnStateTracker {
    fn on_ble_event(&mut self, event: &BleEvent, _ctx: &mut C) -> Result<(), FirmwareError> {
        match *event {
            BleEvent::Connected { conn_handle, .. } => {
                self.conn_handle = conn_handle;
                self.status_flags = FLAG_CONNECTED;
            }
            BleEvent::Disconnected { .. } => {
                self.conn_handle = CONN_HANDLE_INVALID;
                self.status_flags = 0;
            }
            BleEvent::SecurityUpdated { conn_handle, encrypted } if conn_handle == self.conn_handle => {
                self.set_flag(FLAG_ENCRYPTED, encrypted);
                debug!("CONN_STATE: link {} encrypted={}", conn_handle, encrypted);
            }
            BleEvent::Bonded { conn_handle, .. } if conn_handle == self.conn_handle => {
                self.set_flag(FLAG_BONDED, true);
            }
            _ => {}
        }
        Ok(())
    }
}
