//! Sensor Service Handler
//!
//! Wires the sampling pipeline to the link: the first write from the
//! central starts sampling, disconnect stops it, and every filtered
//! reading becomes a one-byte notification.

use defmt::{debug, warn};

use crate::app::AppContext;
use crate::ble::events::{BleEvent, EventHandler};
use crate::core::config::BATTERY_LOW_WARNING;
use crate::core::error::{FirmwareError, StackError};
use crate::core::hal::{BatteryMonitor, BleStack, TriggerFabric};
use crate::sensor::filter::{Emission, HysteresisFilter};

pub struct SensorService<M> {
    filter: HysteresisFilter,
    battery: M,
    notifications_sent: u32,
}

impl<M: BatteryMonitor> SensorService<M> {
    pub const fn new(battery: M) -> Self {
        Self {
            filter: HysteresisFilter::new(),
            battery,
            notifications_sent: 0,
        }
    }

    pub fn filter(&self) -> &HysteresisFilter {
        &self.filter
    }

    pub fn notifications_sent(&self) -> u32 {
        self.notifications_sent
    }

    /// Filter a batch mean and notify the result while a link exists.
    pub fn on_reading<S: BleStack, F>(
        &mut self,
        reading: u16,
        ctx: &mut AppContext<S, F>,
    ) -> Result<Option<Emission>, FirmwareError> {
        let Some(conn_handle) = ctx.link.handle() else {
            debug!("SENSOR: reading {} without link dropped", reading);
            return Ok(None);
        };
        let Some(emission) = self.filter.process(reading) else {
            return Ok(None);
        };
        self.send(&mut ctx.stack, conn_handle, emission.value)?;
        Ok(Some(emission))
    }

    /// A link the stack already closed drops the value; its disconnect
    /// event is still queued behind this one.
    fn send<S: BleStack>(&mut self, stack: &mut S, conn_handle: u16, value: u8) -> Result<(), FirmwareError> {
        match stack.notify(conn_handle, &[value]) {
            Ok(()) => {
                self.notifications_sent = self.notifications_sent.wrapping_add(1);
                Ok(())
            }
            Err(StackError::Disconnected) => {
                debug!("SENSOR: link {} closing, {} not sent", conn_handle, value);
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    fn send_battery_warning<S: BleStack>(&mut self, stack: &mut S, conn_handle: u16) -> Result<(), FirmwareError> {
        if self.battery.is_low() {
            warn!("SENSOR: battery low");
            self.send(stack, conn_handle, BATTERY_LOW_WARNING)?;
        }
        Ok(())
    }
}

impl<S: BleStack, F: TriggerFabric, M: BatteryMonitor> EventHandler<AppContext<S, F>> for SensorService<M> {
    fn on_ble_event(&mut self, event: &BleEvent, ctx: &mut AppContext<S, F>) -> Result<(), FirmwareError> {
        match *event {
            BleEvent::Disconnected { .. } => {
                ctx.trigger.disable()?;
            }
            BleEvent::GattsWrite { conn_handle, target } => {
                if !ctx.link.is_connected() {
                    return Ok(());
                }
                debug!("SENSOR: write to {}", target);
                self.send_battery_warning(&mut ctx.stack, conn_handle)?;
                ctx.trigger.enable()?;
            }
            _ => {}
        }
        Ok(())
    }
}
