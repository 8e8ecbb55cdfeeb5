//! GATT Server
//!
//! A single vendor service: the filtered sensor value (read, notify) and a
//! control point whose writes arm the sampler.

use nrf_softdevice::ble::gatt_server::NotifyValueError;
use nrf_softdevice::ble::Connection;

use parklett_sensor_firmware::ble::events::WriteTarget;
use parklett_sensor_firmware::core::error::StackError;

#[nrf_softdevice::gatt_service(uuid = "f3641400-00b0-4240-ba50-05ca45bf8abc")]
pub struct SensorService {
    /// Latest filtered sensor value
    #[characteristic(uuid = "f3641401-00b0-4240-ba50-05ca45bf8abc", read, notify)]
    data: u8,

    /// Any write starts sampling
    #[characteristic(uuid = "f3641402-00b0-4240-ba50-05ca45bf8abc", write)]
    control: u8,
}

#[nrf_softdevice::gatt_server]
pub struct Server {
    sensor: SensorService,
}

/// Map a server event onto the write target the dispatcher understands.
pub fn write_target(event: &ServerEvent) -> WriteTarget {
    match event {
        ServerEvent::Sensor(SensorServiceEvent::ControlWrite(_)) => WriteTarget::Control,
        ServerEvent::Sensor(SensorServiceEvent::DataCccdWrite { notifications }) => {
            WriteTarget::SensorCccd {
                notifications: *notifications,
            }
        }
    }
}

/// Notify the sensor value on a live connection.
pub fn notify_data(server: &Server, conn: &Connection, value: u8) -> Result<(), StackError> {
    server
        .sensor
        .data_notify(conn, &value)
        .map_err(|err| match err {
            NotifyValueError::Disconnected => StackError::Disconnected,
            NotifyValueError::Raw(_) => StackError::NotifyFailed,
        })
}
