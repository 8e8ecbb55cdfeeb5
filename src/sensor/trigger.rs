//! Sampling Trigger Fabric
//!
//! Owns the single routing channel binding the sampling timer's compare
//! event to the SAADC sample task. Steady-state sampling never involves
//! software; the application only enables the route while a central is
//! streaming and disables it on disconnect.

use defmt::{debug, info};

use crate::core::config::SAMPLE_PERIOD_TICKS;
use crate::core::error::HalError;
use crate::core::hal::{ChannelId, TriggerFabric};

/// Routing state of the trigger channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum TriggerState {
    Unallocated,
    Disabled,
    Enabled,
}

pub struct SamplingTrigger<F> {
    fabric: F,
    channel: Option<ChannelId>,
    enabled: bool,
}

impl<F: TriggerFabric> SamplingTrigger<F> {
    pub const fn new(fabric: F) -> Self {
        Self {
            fabric,
            channel: None,
            enabled: false,
        }
    }

    /// Allocate the routing channel. Called once at boot.
    pub fn init(&mut self) -> Result<(), HalError> {
        if self.channel.is_some() {
            return Ok(());
        }
        let channel = self.fabric.allocate(SAMPLE_PERIOD_TICKS)?;
        info!("TRIGGER: channel {} routes timer compare every {} ticks", channel, SAMPLE_PERIOD_TICKS);
        self.channel = Some(channel);
        Ok(())
    }

    pub fn enable(&mut self) -> Result<(), HalError> {
        let channel = self.channel.ok_or(HalError::ChannelNotAllocated)?;
        self.fabric.enable(channel)?;
        if !self.enabled {
            debug!("TRIGGER: sampling enabled");
        }
        self.enabled = true;
        Ok(())
    }

    /// Stop routing. Safe to call while already disabled.
    pub fn disable(&mut self) -> Result<(), HalError> {
        let channel = self.channel.ok_or(HalError::ChannelNotAllocated)?;
        self.fabric.disable(channel)?;
        if self.enabled {
            debug!("TRIGGER: sampling disabled");
        }
        self.enabled = false;
        Ok(())
    }

    pub fn state(&self) -> TriggerState {
        match (self.channel, self.enabled) {
            (None, _) => TriggerState::Unallocated,
            (Some(_), false) => TriggerState::Disabled,
            (Some(_), true) => TriggerState::Enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn fabric(&self) -> &F {
        &self.fabric
    }

    pub fn fabric_mut(&mut self) -> &mut F {
        &mut self.fabric
    }
}
