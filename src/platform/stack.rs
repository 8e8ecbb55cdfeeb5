//! SoftDevice adapter
//!
//! [`SdStack`] is the application's handle on the stack. Advertising is run
//! by [`ble_task`], which owns the connection lifetime and turns its
//! transitions into [`BleEvent`]s; everything else is a direct SoftDevice
//! call on the live connection.

use defmt::{debug, error, info, warn};
use embassy_futures::select::select;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Instant, Timer};
use nrf_softdevice::ble::advertisement_builder::{
    Flag, LegacyAdvertisementBuilder, LegacyAdvertisementPayload, ServiceList,
};
use nrf_softdevice::ble::peripheral::{self, AdvertiseError, ConnectableAdvertisement};
use nrf_softdevice::ble::{gatt_server, Connection, SetConnParamsError};
use nrf_softdevice::{raw, Softdevice};

use parklett_sensor_firmware::ble::events::BleEvent;
use parklett_sensor_firmware::core::config::{
    AdvertisingConfig, ConnParams, DEVICE_NAME, SENSOR_SERVICE_UUID_LE,
};
use parklett_sensor_firmware::core::error::{fatal, StackError};
use parklett_sensor_firmware::core::hal::{BleStack, ConnHandle, HciReason};

use super::bonds::Bonder;
use super::{post, set_connection, with_connection};
use crate::services::{self, Server};

/// How often the live connection is checked for renegotiated parameters.
const CONN_PARAMS_POLL: Duration = Duration::from_secs(1);

static ADVERTISE: Signal<CriticalSectionRawMutex, AdvertisingConfig> = Signal::new();

static ADV_DATA: LegacyAdvertisementPayload = LegacyAdvertisementBuilder::new()
    .flags(&[Flag::LimitedDiscovery, Flag::LE_Only])
    .full_name(DEVICE_NAME)
    .build();

static SCAN_DATA: LegacyAdvertisementPayload = LegacyAdvertisementBuilder::new()
    .services_128(ServiceList::Complete, &[SENSOR_SERVICE_UUID_LE])
    .build();

pub fn conn_params_from_raw(params: &raw::ble_gap_conn_params_t) -> ConnParams {
    ConnParams {
        min_conn_interval: params.min_conn_interval,
        max_conn_interval: params.max_conn_interval,
        slave_latency: params.slave_latency,
        conn_sup_timeout: params.conn_sup_timeout,
    }
}

fn conn_params_to_raw(params: &ConnParams) -> raw::ble_gap_conn_params_t {
    raw::ble_gap_conn_params_t {
        min_conn_interval: params.min_conn_interval,
        max_conn_interval: params.max_conn_interval,
        slave_latency: params.slave_latency,
        conn_sup_timeout: params.conn_sup_timeout,
    }
}

/// Publish the peripheral preferred connection parameters (PPCP).
pub fn set_preferred_conn_params(params: &ConnParams) -> Result<(), StackError> {
    let raw_params = conn_params_to_raw(params);
    let ret = unsafe { raw::sd_ble_gap_ppcp_set(&raw_params) };
    if ret != raw::NRF_SUCCESS {
        return Err(StackError::Raw(ret));
    }
    info!("CONN_PARAMS: preferred {}", params);
    Ok(())
}

pub struct SdStack {
    server: &'static Server,
    conn_params_deadline: Option<Instant>,
}

impl SdStack {
    pub fn new(server: &'static Server) -> Self {
        Self {
            server,
            conn_params_deadline: None,
        }
    }

    /// Expiry of the connection parameter timer, if armed.
    pub fn conn_params_deadline(&self) -> Option<Instant> {
        self.conn_params_deadline
    }

    /// Disarm the timer after it fired.
    pub fn take_conn_params_deadline(&mut self) -> Option<Instant> {
        self.conn_params_deadline.take()
    }
}

impl BleStack for SdStack {
    fn start_advertising(&mut self, config: &AdvertisingConfig) -> Result<(), StackError> {
        ADVERTISE.signal(*config);
        Ok(())
    }

    fn notify(&mut self, handle: ConnHandle, payload: &[u8]) -> Result<(), StackError> {
        let &[value] = payload else {
            return Err(StackError::NotifyFailed);
        };
        with_connection(handle, |conn| services::notify_data(self.server, conn, value))
    }

    fn disconnect(&mut self, handle: ConnHandle, reason: HciReason) -> Result<(), StackError> {
        let ret = unsafe { raw::sd_ble_gap_disconnect(handle, reason as u8) };
        if ret != raw::NRF_SUCCESS {
            return Err(StackError::Raw(ret));
        }
        Ok(())
    }

    fn request_conn_params(&mut self, handle: ConnHandle, params: &ConnParams) -> Result<(), StackError> {
        with_connection(handle, |conn| {
            conn.set_conn_params(conn_params_to_raw(params))
                .map_err(|err| match err {
                    SetConnParamsError::Disconnected => StackError::Disconnected,
                    SetConnParamsError::Raw(_) => StackError::ConnParamsRejected,
                })
        })
    }

    fn start_conn_params_timer(&mut self, after: Duration) {
        self.conn_params_deadline = Some(Instant::now() + after);
    }

    fn stop_conn_params_timer(&mut self) {
        self.conn_params_deadline = None;
    }
}

/// Report parameter changes negotiated by the central. Never returns; the
/// caller races it against the GATT server.
async fn watch_conn_params(conn: &Connection, conn_handle: ConnHandle) {
    let mut current = conn_params_from_raw(&conn.conn_params());
    loop {
        Timer::after(CONN_PARAMS_POLL).await;
        let params = conn_params_from_raw(&conn.conn_params());
        if params != current {
            debug!("CONN_PARAMS: updated by central {}", params);
            current = params;
            post(BleEvent::ConnParamsUpdated { conn_handle, params });
        }
    }
}

#[embassy_executor::task]
pub async fn ble_task(sd: &'static Softdevice, server: &'static Server, bonder: &'static Bonder) -> ! {
    loop {
        let config = ADVERTISE.wait().await;
        let adv_config = peripheral::Config {
            interval: config.interval,
            timeout: Some(config.timeout_10ms()),
            ..Default::default()
        };
        let adv = ConnectableAdvertisement::ScannableUndirected {
            adv_data: &ADV_DATA,
            scan_data: &SCAN_DATA,
        };
        info!("ADV: slow advertising, interval {} timeout {}s", config.interval, config.timeout_secs);

        let conn = match peripheral::advertise_pairable(sd, adv, &adv_config, bonder).await {
            Ok(conn) => conn,
            Err(AdvertiseError::Timeout) => {
                post(BleEvent::AdvertisingTimeout);
                continue;
            }
            Err(e) => {
                error!("ADV: advertising failed: {:?}", e);
                fatal(StackError::AdvertisingFailed.into());
            }
        };
        let Some(conn_handle) = conn.handle() else {
            // No Connected was posted, so no Disconnected will restart
            // advertising. Report it like an expiry instead.
            warn!("LINK: connection dropped before it was reported");
            post(BleEvent::AdvertisingTimeout);
            continue;
        };

        set_connection(Some(conn.clone()));
        post(BleEvent::Connected {
            conn_handle,
            params: conn_params_from_raw(&conn.conn_params()),
        });

        let gatt = gatt_server::run(&conn, server, |event| {
            post(BleEvent::GattsWrite {
                conn_handle,
                target: services::write_target(&event),
            });
        });
        select(gatt, watch_conn_params(&conn, conn_handle)).await;

        set_connection(None);
        // The disconnect reason is consumed inside the SoftDevice driver.
        post(BleEvent::Disconnected {
            conn_handle,
            reason: HciReason::RemoteUserTerminated as u8,
        });
    }
}

#[embassy_executor::task]
pub async fn softdevice_task(sd: &'static Softdevice) -> ! {
    sd.run().await
}
