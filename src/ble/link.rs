//! Link Management
//!
//! Local connect/disconnect handling for the single peripheral link:
//! records the connection handle and switches sensor power with it.

use defmt::{info, Format};

use crate::app::AppContext;
use crate::ble::conn_state::CONN_HANDLE_INVALID;
use crate::ble::events::{BleEvent, EventHandler};
use crate::core::error::FirmwareError;
use crate::core::hal::{ConnHandle, SensorPower};

/// Lifecycle phase of the link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
pub enum LinkPhase {
    /// Booted, not yet advertising
    Idle,
    Advertising,
    Connected,
}

/// Connection handle and phase shared with the later dispatch stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
pub struct Link {
    conn_handle: ConnHandle,
    phase: LinkPhase,
}

impl Default for Link {
    fn default() -> Self {
        Self::new()
    }
}

impl Link {
    pub const fn new() -> Self {
        Self {
            conn_handle: CONN_HANDLE_INVALID,
            phase: LinkPhase::Idle,
        }
    }

    /// Handle of the live link, if any.
    pub fn handle(&self) -> Option<ConnHandle> {
        (self.conn_handle != CONN_HANDLE_INVALID).then_some(self.conn_handle)
    }

    pub fn phase(&self) -> LinkPhase {
        self.phase
    }

    pub fn is_connected(&self) -> bool {
        self.phase == LinkPhase::Connected
    }

    pub(crate) fn set_advertising(&mut self) {
        if self.phase != LinkPhase::Connected {
            self.phase = LinkPhase::Advertising;
        }
    }

    fn connect(&mut self, conn_handle: ConnHandle) {
        self.conn_handle = conn_handle;
        self.phase = LinkPhase::Connected;
    }

    fn disconnect(&mut self) {
        self.conn_handle = CONN_HANDLE_INVALID;
        self.phase = LinkPhase::Advertising;
    }
}

pub struct LinkManager<P> {
    power: P,
}

impl<P: SensorPower> LinkManager<P> {
    pub fn new(mut power: P) -> Self {
        power.set_powered(false);
        Self { power }
    }

    pub fn power(&self) -> &P {
        &self.power
    }
}

impl<S, F, P: SensorPower> EventHandler<AppContext<S, F>> for LinkManager<P> {
    fn on_ble_event(&mut self, event: &BleEvent, ctx: &mut AppContext<S, F>) -> Result<(), FirmwareError> {
        match *event {
            BleEvent::Connected { conn_handle, .. } => {
                info!("LINK: connected, handle {}", conn_handle);
                ctx.link.connect(conn_handle);
                self.power.set_powered(true);
            }
            BleEvent::Disconnected { conn_handle, reason } => {
                info!("LINK: disconnected, handle {} reason {=u8:#04x}", conn_handle, reason);
                ctx.link.disconnect();
                self.power.set_powered(false);
            }
            _ => {}
        }
        Ok(())
    }
}
