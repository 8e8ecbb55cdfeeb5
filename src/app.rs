//! Event Dispatcher
//!
//! [`App`] owns the application context and the dispatch stages. Each stack
//! event runs through the stages exactly once, in a fixed order; a stage may
//! rely on state written by the ones before it (the sensor service reads the
//! link recorded by the link manager).

use defmt::{debug, info, warn};

use crate::ble::advertising::AdvController;
use crate::ble::bonding::BondManager;
use crate::ble::conn_params::{ConnParamsNegotiator, ConnParamsOutcome};
use crate::ble::conn_state::ConnStateTracker;
use crate::ble::events::{AppEvent, BleEvent, EventHandler};
use crate::ble::link::{Link, LinkManager};
use crate::ble::service::SensorService;
use crate::core::config::FirmwareConfig;
use crate::core::error::FirmwareError;
use crate::core::hal::{BatteryMonitor, BleStack, BondStore, HciReason, SensorPower, TriggerFabric};
use crate::sensor::filter::Emission;
use crate::sensor::trigger::SamplingTrigger;

/// State shared by the dispatch stages.
pub struct AppContext<S, F> {
    pub stack: S,
    pub trigger: SamplingTrigger<F>,
    pub link: Link,
}

impl<S, F: TriggerFabric> AppContext<S, F> {
    pub const fn new(stack: S, fabric: F) -> Self {
        Self {
            stack,
            trigger: SamplingTrigger::new(fabric),
            link: Link::new(),
        }
    }
}

pub struct App<S, F, P, M, B> {
    ctx: AppContext<S, F>,
    conn_state: ConnStateTracker,
    conn_params: ConnParamsNegotiator,
    link: LinkManager<P>,
    service: SensorService<M>,
    advertising: AdvController,
    bonding: BondManager<B>,
    erase_bonds_on_boot: bool,
}

impl<S, F, P, M, B> App<S, F, P, M, B>
where
    S: BleStack,
    F: TriggerFabric,
    P: SensorPower,
    M: BatteryMonitor,
    B: BondStore,
{
    pub fn new(config: FirmwareConfig, stack: S, fabric: F, power: P, battery: M, bonds: B) -> Self {
        Self {
            ctx: AppContext::new(stack, fabric),
            conn_state: ConnStateTracker::new(),
            conn_params: ConnParamsNegotiator::new(config.conn_params),
            link: LinkManager::new(power),
            service: SensorService::new(battery),
            advertising: AdvController::new(config.advertising),
            bonding: BondManager::new(bonds, config.security),
            erase_bonds_on_boot: config.erase_bonds_on_boot,
        }
    }

    /// Allocate the sampling route, apply the bond policy and start
    /// advertising.
    pub fn boot(&mut self) -> Result<(), FirmwareError> {
        self.ctx.trigger.init()?;
        self.bonding.init(self.erase_bonds_on_boot)?;
        self.advertising.start(&mut self.ctx)?;
        info!("APP: boot complete, advertising");
        Ok(())
    }

    pub fn handle(&mut self, event: AppEvent) -> Result<(), FirmwareError> {
        match event {
            AppEvent::Ble(event) => self.on_ble_event(&event),
            AppEvent::Reading(reading) => self.on_reading(reading).map(|_| ()),
            AppEvent::ConnParamsTimeout => self.on_conn_params_timeout(),
        }
    }

    /// Run one stack event through every stage.
    pub fn on_ble_event(&mut self, event: &BleEvent) -> Result<(), FirmwareError> {
        debug!("APP: dispatching {}", event);
        let stages: [&mut dyn EventHandler<AppContext<S, F>>; 6] = [
            &mut self.conn_state,
            &mut self.conn_params,
            &mut self.link,
            &mut self.service,
            &mut self.advertising,
            &mut self.bonding,
        ];
        for stage in stages {
            stage.on_ble_event(event, &mut self.ctx)?;
        }
        self.apply_conn_params_outcome()
    }

    pub fn on_reading(&mut self, reading: u16) -> Result<Option<Emission>, FirmwareError> {
        self.service.on_reading(reading, &mut self.ctx)
    }

    pub fn on_conn_params_timeout(&mut self) -> Result<(), FirmwareError> {
        self.conn_params.on_timeout(&mut self.ctx.stack)?;
        self.apply_conn_params_outcome()
    }

    fn apply_conn_params_outcome(&mut self) -> Result<(), FirmwareError> {
        match self.conn_params.take_outcome() {
            Some(ConnParamsOutcome::Failed { conn_handle }) => {
                warn!("APP: connection parameters rejected, dropping link {}", conn_handle);
                self.ctx
                    .stack
                    .disconnect(conn_handle, HciReason::ConnIntervalUnacceptable)?;
            }
            Some(ConnParamsOutcome::Succeeded { conn_handle }) => {
                debug!("APP: connection parameters accepted on link {}", conn_handle);
            }
            None => {}
        }
        Ok(())
    }

    pub fn context(&self) -> &AppContext<S, F> {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut AppContext<S, F> {
        &mut self.ctx
    }

    pub fn conn_state(&self) -> &ConnStateTracker {
        &self.conn_state
    }

    pub fn conn_params(&self) -> &ConnParamsNegotiator {
        &self.conn_params
    }

    pub fn link_manager(&self) -> &LinkManager<P> {
        &self.link
    }

    pub fn service(&self) -> &SensorService<M> {
        &self.service
    }

    pub fn advertising(&self) -> &AdvController {
        &self.advertising
    }

    pub fn bonding(&self) -> &BondManager<B> {
        &self.bonding
    }
}
