//! BLE Advertising Controller
//!
//! Slow advertising only. The controller starts advertising at boot,
//! resumes it after a disconnect and restarts it every time it times out
//! without a connection.

use defmt::{debug, info};

use crate::app::AppContext;
use crate::ble::events::{BleEvent, EventHandler};
use crate::core::config::{AdvMode, AdvertisingConfig};
use crate::core::error::FirmwareError;
use crate::core::hal::BleStack;

pub struct AdvController {
    config: AdvertisingConfig,
    mode: AdvMode,
    /// Restarts after an idle timeout since boot
    restarts: u32,
}

impl AdvController {
    pub const fn new(config: AdvertisingConfig) -> Self {
        Self {
            config,
            mode: AdvMode::Idle,
            restarts: 0,
        }
    }

    /// Begin slow advertising.
    pub fn start<S: BleStack, F>(&mut self, ctx: &mut AppContext<S, F>) -> Result<(), FirmwareError> {
        ctx.stack.start_advertising(&self.config)?;
        self.mode = AdvMode::Slow;
        ctx.link.set_advertising();
        debug!(
            "ADV: slow advertising, interval {} timeout {}s",
            self.config.interval, self.config.timeout_secs
        );
        Ok(())
    }

    pub fn mode(&self) -> AdvMode {
        self.mode
    }

    pub fn restarts(&self) -> u32 {
        self.restarts
    }

    pub fn config(&self) -> &AdvertisingConfig {
        &self.config
    }

    fn on_idle<S: BleStack, F>(&mut self, ctx: &mut AppContext<S, F>) -> Result<(), FirmwareError> {
        info!("ADV: advertising timed out, restarting");
        self.restarts = self.restarts.wrapping_add(1);
        self.start(ctx)
    }
}

impl<S: BleStack, F> EventHandler<AppContext<S, F>> for AdvController {
    fn on_ble_event(&mut self, event: &BleEvent, ctx: &mut AppContext<S, F>) -> Result<(), FirmwareError> {
        match *event {
            BleEvent::Connected { .. } => {
                self.mode = AdvMode::Idle;
            }
            BleEvent::Disconnected { .. } => {
                self.start(ctx)?;
            }
            BleEvent::AdvertisingTimeout => {
                self.mode = AdvMode::Idle;
                self.on_idle(ctx)?;
            }
            _ => {}
        }
        Ok(())
    }
}
