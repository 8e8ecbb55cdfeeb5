//! Common test utilities and setup for embedded tests
//!
//! This module provides shared functionality for all defmt-test based tests:
//! - Critical section, logger and panic handler
//! - Heap for proptest
//! - Recording mocks for every hardware trait of the core
//! - Event constructors

#![allow(dead_code)]

// Re-export commonly used items for tests (except conflicting macros)
pub use defmt_rtt as _; // global logger
pub use embassy_executor as _;
// nrf-softdevice provides the interrupt vectors and critical section
pub use nrf_softdevice as _;
pub use panic_probe as _; // panic handler
pub use {embassy_nrf as _, embassy_sync as _};

// Global allocator for proptest (required for alloc feature in no_std)
pub extern crate alloc;
#[allow(unused)]
pub use alloc::vec;
use core::sync::atomic::{AtomicBool, Ordering};

pub use embedded_alloc::LlffHeap as Heap;

use embassy_time::Duration;
use heapless::Vec;
use parklett_sensor_firmware::app::App;
use parklett_sensor_firmware::ble::bonding::BondRecord;
use parklett_sensor_firmware::ble::events::{BleEvent, WriteTarget};
use parklett_sensor_firmware::core::config::{AdvertisingConfig, ConnParams, FirmwareConfig};
use parklett_sensor_firmware::core::error::{BondError, HalError, StackError};
use parklett_sensor_firmware::core::hal::{
    BatchSampler, BatteryMonitor, BleStack, BondStore, ChannelId, ConnHandle, HciReason, SensorPower,
    TriggerFabric,
};

#[global_allocator]
pub static HEAP: Heap = Heap::empty();

pub static mut HEAP_MEM: [u8; 8192] = [0; 8192];

static HEAP_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Ensure heap is initialized exactly once
pub fn ensure_heap_initialized() {
    if !HEAP_INITIALIZED.swap(true, Ordering::Relaxed) {
        unsafe {
            let ptr = core::ptr::addr_of_mut!(HEAP_MEM) as *mut u8;
            HEAP.init(ptr as usize, 8192);
        }
    }
}

pub const TEST_HANDLE: ConnHandle = 0x0001;

/// Call recorded by [`MockStack`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum StackCall {
    StartAdvertising(AdvertisingConfig),
    Notify(ConnHandle, u8),
    Disconnect(ConnHandle, HciReason),
    RequestConnParams(ConnHandle, ConnParams),
    StartTimer(Duration),
    StopTimer,
}

#[derive(Default)]
pub struct MockStack {
    pub calls: Vec<StackCall, 64>,
    pub timer: Option<Duration>,
    pub fail_notify: bool,
    /// The stack already closed the link; its disconnect is still queued.
    pub link_closed: bool,
}

impl MockStack {
    pub fn notifications(&self) -> Vec<u8, 64> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                StackCall::Notify(_, value) => Some(*value),
                _ => None,
            })
            .collect()
    }

    pub fn advertising_starts(&self) -> usize {
        self.calls
            .iter()
            .filter(|call| matches!(call, StackCall::StartAdvertising(_)))
            .count()
    }

    pub fn conn_params_requests(&self) -> usize {
        self.calls
            .iter()
            .filter(|call| matches!(call, StackCall::RequestConnParams(..)))
            .count()
    }

    pub fn disconnects(&self) -> Vec<(ConnHandle, HciReason), 8> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                StackCall::Disconnect(handle, reason) => Some((*handle, *reason)),
                _ => None,
            })
            .collect()
    }

    fn record(&mut self, call: StackCall) {
        let _ = self.calls.push(call);
    }
}

impl BleStack for MockStack {
    fn start_advertising(&mut self, config: &AdvertisingConfig) -> Result<(), StackError> {
        self.record(StackCall::StartAdvertising(*config));
        Ok(())
    }

    fn notify(&mut self, handle: ConnHandle, payload: &[u8]) -> Result<(), StackError> {
        if self.link_closed {
            return Err(StackError::Disconnected);
        }
        if self.fail_notify || payload.len() != 1 {
            return Err(StackError::NotifyFailed);
        }
        self.record(StackCall::Notify(handle, payload[0]));
        Ok(())
    }

    fn disconnect(&mut self, handle: ConnHandle, reason: HciReason) -> Result<(), StackError> {
        self.record(StackCall::Disconnect(handle, reason));
        Ok(())
    }

    fn request_conn_params(&mut self, handle: ConnHandle, params: &ConnParams) -> Result<(), StackError> {
        if self.link_closed {
            return Err(StackError::Disconnected);
        }
        self.record(StackCall::RequestConnParams(handle, *params));
        Ok(())
    }

    fn start_conn_params_timer(&mut self, after: Duration) {
        self.timer = Some(after);
        self.record(StackCall::StartTimer(after));
    }

    fn stop_conn_params_timer(&mut self) {
        self.timer = None;
        self.record(StackCall::StopTimer);
    }
}

#[derive(Default)]
pub struct MockFabric {
    pub allocations: u8,
    pub enabled: bool,
    pub enable_calls: u8,
    pub disable_calls: u8,
    pub exhausted: bool,
}

impl TriggerFabric for MockFabric {
    fn allocate(&mut self, _period_ticks: u32) -> Result<ChannelId, HalError> {
        if self.exhausted {
            return Err(HalError::ChannelUnavailable);
        }
        self.allocations += 1;
        Ok(ChannelId(self.allocations))
    }

    fn enable(&mut self, _channel: ChannelId) -> Result<(), HalError> {
        self.enabled = true;
        self.enable_calls += 1;
        Ok(())
    }

    fn disable(&mut self, _channel: ChannelId) -> Result<(), HalError> {
        self.enabled = false;
        self.disable_calls += 1;
        Ok(())
    }
}

#[derive(Default)]
pub struct MockSampler {
    pub rearms: u32,
    pub fail: bool,
}

impl BatchSampler for MockSampler {
    fn rearm(&mut self) -> Result<(), HalError> {
        if self.fail {
            return Err(HalError::Busy);
        }
        self.rearms += 1;
        Ok(())
    }
}

#[derive(Default)]
pub struct MockPower {
    pub powered: bool,
    pub switches: u8,
}

impl SensorPower for MockPower {
    fn set_powered(&mut self, on: bool) {
        self.powered = on;
        self.switches += 1;
    }
}

#[derive(Default)]
pub struct MockBattery {
    pub low: bool,
}

impl BatteryMonitor for MockBattery {
    fn is_low(&mut self) -> bool {
        self.low
    }
}

#[derive(Default)]
pub struct MockBondStore {
    pub stored: Vec<BondRecord, 8>,
    pub erases: u8,
}

impl BondStore for MockBondStore {
    fn erase_all(&mut self) -> Result<(), BondError> {
        self.stored.clear();
        self.erases += 1;
        Ok(())
    }

    fn store(&mut self, record: BondRecord) -> Result<(), BondError> {
        self.stored.push(record).map_err(|_| BondError::Storage)
    }
}

pub type TestApp = App<MockStack, MockFabric, MockPower, MockBattery, MockBondStore>;

pub fn test_app(config: FirmwareConfig, battery_low: bool) -> TestApp {
    App::new(
        config,
        MockStack::default(),
        MockFabric::default(),
        MockPower::default(),
        MockBattery { low: battery_low },
        MockBondStore::default(),
    )
}

/// Application booted with the default configuration.
pub fn booted_app() -> TestApp {
    let mut app = test_app(FirmwareConfig::default(), false);
    app.boot().unwrap();
    app
}

pub fn connected(conn_handle: ConnHandle) -> BleEvent {
    connected_with(conn_handle, ConnParams::PREFERRED)
}

pub fn connected_with(conn_handle: ConnHandle, params: ConnParams) -> BleEvent {
    BleEvent::Connected { conn_handle, params }
}

pub fn disconnected(conn_handle: ConnHandle) -> BleEvent {
    BleEvent::Disconnected {
        conn_handle,
        reason: HciReason::RemoteUserTerminated as u8,
    }
}

pub fn control_write(conn_handle: ConnHandle) -> BleEvent {
    BleEvent::GattsWrite {
        conn_handle,
        target: WriteTarget::Control,
    }
}

/// Parameters outside the preferred range (interval 100 ms).
pub fn slow_params() -> ConnParams {
    ConnParams {
        min_conn_interval: 80,
        max_conn_interval: 80,
        slave_latency: 0,
        conn_sup_timeout: 400,
    }
}

pub fn test_bond(seed: u8) -> BondRecord {
    BondRecord {
        ediv: 0x1000 + seed as u16,
        rand: [seed; 8],
        ltk: [seed.wrapping_add(0x40); 16],
        ltk_flags: 0,
        peer_addr: [0xC0, 0x01, 0x02, 0x03, 0x04, seed],
        peer_addr_type: 1,
    }
}
