//! Unified error type and fatal error handler.
//!
//! Any failure reported by the stack or a hardware driver is unrecoverable:
//! it is propagated with `?` up to the application task, which hands it to
//! [`fatal`]. Variants carry only fixed-size data so the enums stay `Copy`.

use core::panic::Location;

use defmt::{error, Format};

/// Diagnostic sentinel logged with every fatal error.
pub const DEAD_BEEF: u32 = 0xDEAD_BEEF;

/// Hardware abstraction failures (timer, routing fabric, sampler, GPIO).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
pub enum HalError {
    /// No free routing channel left.
    ChannelUnavailable,
    /// The routing channel was used before it was allocated.
    ChannelNotAllocated,
    /// Peripheral busy with a previous request.
    Busy,
}

/// SoftDevice call failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
pub enum StackError {
    /// Raw NRF error code returned by the SoftDevice.
    Raw(u32),
    /// The connection handle no longer refers to a live link.
    Disconnected,
    /// Notification rejected (CCCD not enabled or TX queue full).
    NotifyFailed,
    /// Request queue between application and BLE task is full.
    QueueFull,
    /// Advertising could not be started.
    AdvertisingFailed,
    /// Connection parameter update request refused by the SoftDevice.
    ConnParamsRejected,
}

/// Bond table and persistence failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
pub enum BondError {
    /// Serialized bond table does not fit the storage buffer.
    Encode,
    /// Stored bond table could not be decoded.
    Decode,
    /// Flash read, write or erase failed.
    Storage,
}

/// Top-level error type used across the firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
pub enum FirmwareError {
    Hal(HalError),
    Stack(StackError),
    Bond(BondError),
}

impl From<HalError> for FirmwareError {
    fn from(err: HalError) -> Self {
        FirmwareError::Hal(err)
    }
}

impl From<StackError> for FirmwareError {
    fn from(err: StackError) -> Self {
        FirmwareError::Stack(err)
    }
}

impl From<BondError> for FirmwareError {
    fn from(err: BondError) -> Self {
        FirmwareError::Bond(err)
    }
}

/// Halt the firmware. The device stops responding until power-cycled.
#[track_caller]
pub fn fatal(err: FirmwareError) -> ! {
    let location = Location::caller();
    error!(
        "FATAL: {} (sentinel {=u32:#010x}) at {=str}:{=u32}",
        err,
        DEAD_BEEF,
        location.file(),
        location.line()
    );
    defmt::panic!("fatal error {:#010x}", DEAD_BEEF)
}

/// `APP_ERROR_CHECK` for call sites outside the dispatcher.
pub trait OrFatal<T> {
    fn or_fatal(self) -> T;
}

impl<T, E: Into<FirmwareError>> OrFatal<T> for Result<T, E> {
    #[track_caller]
    fn or_fatal(self) -> T {
        match self {
            Ok(value) => value,
            Err(err) => fatal(err.into()),
        }
    }
}
