//! External sensor power switch on a GPIO.

use defmt::debug;
use embassy_nrf::gpio::Output;

use parklett_sensor_firmware::core::hal::SensorPower;

pub struct GpioSensorPower {
    pin: Output<'static>,
}

impl GpioSensorPower {
    pub fn new(pin: Output<'static>) -> Self {
        Self { pin }
    }
}

impl SensorPower for GpioSensorPower {
    fn set_powered(&mut self, on: bool) {
        debug!("SENSOR: power {}", if on { "on" } else { "off" });
        if on {
            self.pin.set_high();
        } else {
            self.pin.set_low();
        }
    }
}
