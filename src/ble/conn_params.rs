//! Connection Parameter Negotiation
//!
//! Checks the parameters the central picked against the preferred ones and,
//! if they don't fit, asks for an update on a timer: first after
//! `first_update_delay`, then every `next_update_delay`, at most
//! `max_update_count` times. The result is reported as a
//! [`ConnParamsOutcome`] for the application to act on.

use defmt::{debug, info, warn, Format};

use crate::app::AppContext;
use crate::ble::events::{BleEvent, EventHandler};
use crate::core::config::{ConnParams, ConnParamsConfig};
use crate::core::error::{FirmwareError, StackError};
use crate::core::hal::{BleStack, ConnHandle};

/// Negotiation result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
pub enum ConnParamsOutcome {
    Succeeded { conn_handle: ConnHandle },
    Failed { conn_handle: ConnHandle },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
pub enum NegotiationState {
    Idle,
    Pending { conn_handle: ConnHandle, attempts: u8 },
    Done,
}

pub struct ConnParamsNegotiator {
    config: ConnParamsConfig,
    state: NegotiationState,
    outcome: Option<ConnParamsOutcome>,
    /// Requests already spent on the current link.
    attempts_used: u8,
    gave_up: bool,
}

impl ConnParamsNegotiator {
    pub const fn new(config: ConnParamsConfig) -> Self {
        Self {
            config,
            state: NegotiationState::Idle,
            outcome: None,
            attempts_used: 0,
            gave_up: false,
        }
    }

    /// Interval inside the preferred window, latency and timeout as preferred.
    pub fn is_acceptable(&self, params: &ConnParams) -> bool {
        let preferred = &self.config.preferred;
        params.max_conn_interval >= preferred.min_conn_interval
            && params.max_conn_interval <= preferred.max_conn_interval
            && params.slave_latency == preferred.slave_latency
            && params.conn_sup_timeout == preferred.conn_sup_timeout
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    /// Take the outcome reported since the last call.
    pub fn take_outcome(&mut self) -> Option<ConnParamsOutcome> {
        self.outcome.take()
    }

    /// Timer expiry: send another update request or give up.
    pub fn on_timeout<S: BleStack>(&mut self, stack: &mut S) -> Result<(), FirmwareError> {
        let NegotiationState::Pending { conn_handle, attempts } = self.state else {
            debug!("CONN_PARAMS: stale timeout ignored");
            return Ok(());
        };

        if attempts < self.config.max_update_count {
            match stack.request_conn_params(conn_handle, &self.config.preferred) {
                Ok(()) => {}
                Err(StackError::Disconnected) => {
                    // Negotiation is reset by the queued disconnect event
                    debug!("CONN_PARAMS: link {} closing, request skipped", conn_handle);
                    return Ok(());
                }
                Err(err) => return Err(err.into()),
            }
            let attempts = attempts + 1;
            info!("CONN_PARAMS: update request {} of {} sent", attempts, self.config.max_update_count);
            self.state = NegotiationState::Pending { conn_handle, attempts };
            stack.start_conn_params_timer(self.config.next_update_delay);
        } else {
            self.fail(conn_handle);
        }
        Ok(())
    }

    fn on_params_rejected<S: BleStack>(&mut self, stack: &mut S, conn_handle: ConnHandle, attempts: u8) {
        if attempts < self.config.max_update_count {
            let delay = if attempts == 0 {
                self.config.first_update_delay
            } else {
                self.config.next_update_delay
            };
            stack.start_conn_params_timer(delay);
        } else {
            stack.stop_conn_params_timer();
            self.fail(conn_handle);
        }
    }

    fn succeed<S: BleStack>(&mut self, stack: &mut S, conn_handle: ConnHandle) {
        stack.stop_conn_params_timer();
        self.state = NegotiationState::Done;
        self.outcome = Some(ConnParamsOutcome::Succeeded { conn_handle });
    }

    fn fail(&mut self, conn_handle: ConnHandle) {
        self.gave_up = true;
        warn!("CONN_PARAMS: negotiation failed on link {}", conn_handle);
        self.state = NegotiationState::Done;
        self.outcome = Some(ConnParamsOutcome::Failed { conn_handle });
    }
}

impl<S: BleStack, F> EventHandler<AppContext<S, F>> for ConnParamsNegotiator {
    fn on_ble_event(&mut self, event: &BleEvent, ctx: &mut AppContext<S, F>) -> Result<(), FirmwareError> {
        match *event {
            BleEvent::Connected { conn_handle, params } => {
                self.outcome = None;
                self.attempts_used = 0;
                self.gave_up = false;
                if self.is_acceptable(&params) {
                    self.succeed(&mut ctx.stack, conn_handle);
                } else {
                    debug!("CONN_PARAMS: {} not acceptable, negotiating", params);
                    self.state = NegotiationState::Pending { conn_handle, attempts: 0 };
                    ctx.stack.start_conn_params_timer(self.config.first_update_delay);
                }
            }
            BleEvent::ConnParamsUpdated { conn_handle, params } => {
                if ctx.link.handle() != Some(conn_handle) {
                    return Ok(());
                }
                // The central may renegotiate at any time, not only while a
                // request is outstanding.
                let attempts = match self.state {
                    NegotiationState::Pending { attempts, .. } => attempts,
                    _ => self.attempts_used,
                };
                if self.gave_up {
                    debug!("CONN_PARAMS: link {} already given up", conn_handle);
                    return Ok(());
                }
                if self.is_acceptable(&params) {
                    self.attempts_used = attempts;
                    self.succeed(&mut ctx.stack, conn_handle);
                } else {
                    debug!("CONN_PARAMS: central moved to {}, renegotiating", params);
                    self.state = NegotiationState::Pending { conn_handle, attempts };
                    self.on_params_rejected(&mut ctx.stack, conn_handle, attempts);
                }
            }
            BleEvent::Disconnected { .. } => {
                ctx.stack.stop_conn_params_timer();
                self.state = NegotiationState::Idle;
                self.attempts_used = 0;
                self.gave_up = false;
            }
            _ => {}
        }
        Ok(())
    }
}
