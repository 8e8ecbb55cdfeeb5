//! nRF52 platform layer
//!
//! Implements the hardware traits of the core on top of embassy-nrf and the
//! SoftDevice. Every stack callback and sampler completion ends up as an
//! [`AppEvent`] on [`EVENTS`], drained by the application task in `main`.

pub mod bonds;
pub mod power;
pub mod sampler;
pub mod stack;

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::channel::Channel;
use nrf_softdevice::ble::Connection;

use parklett_sensor_firmware::ble::events::AppEvent;
use parklett_sensor_firmware::core::error::{fatal, StackError};
use parklett_sensor_firmware::core::hal::ConnHandle;

/// Depth of the application event queue.
pub const EVENT_QUEUE_DEPTH: usize = 8;

/// Single-consumer queue feeding the application task.
pub static EVENTS: Channel<CriticalSectionRawMutex, AppEvent, EVENT_QUEUE_DEPTH> = Channel::new();

/// The live connection, if any.
static CONNECTION: Mutex<CriticalSectionRawMutex, RefCell<Option<Connection>>> =
    Mutex::new(RefCell::new(None));

/// Queue an event for the application task. Losing an event would
/// desynchronize the state machine, so a full queue is fatal.
#[track_caller]
pub fn post(event: impl Into<AppEvent>) {
    if EVENTS.try_send(event.into()).is_err() {
        fatal(StackError::QueueFull.into());
    }
}

pub fn set_connection(conn: Option<Connection>) {
    CONNECTION.lock(|cell| *cell.borrow_mut() = conn);
}

/// Run `f` on the live connection if it still carries `handle`.
pub fn with_connection<R>(
    handle: ConnHandle,
    f: impl FnOnce(&Connection) -> Result<R, StackError>,
) -> Result<R, StackError> {
    CONNECTION.lock(|cell| match cell.borrow().as_ref() {
        Some(conn) if conn.handle() == Some(handle) => f(conn),
        _ => Err(StackError::Disconnected),
    })
}
