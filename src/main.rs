#![no_std]
#![no_main]

use core::mem;

use defmt::*;
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_futures::select::{select, Either};
use embassy_nrf::config::Config;
use embassy_nrf::gpio::{Level, Output, OutputDrive};
use embassy_nrf::interrupt::{self, InterruptExt};
use embassy_nrf::saadc::{self, ChannelConfig, Gain, Reference, Resolution, Saadc, Time};
use embassy_nrf::bind_interrupts;
use embassy_time::Timer;
use nrf_softdevice::{raw, Flash, Softdevice};
use panic_probe as _;
use static_cell::StaticCell;

use parklett_sensor_firmware::app::App;
use parklett_sensor_firmware::ble::events::AppEvent;
use parklett_sensor_firmware::core::config::{ConnParams, FirmwareConfig, DEVICE_NAME};
use parklett_sensor_firmware::core::error::{fatal, OrFatal};
use parklett_sensor_firmware::core::hal::NeverLow;

mod platform;
mod services;

use platform::bonds::{self, Bonder, FlashBondStore};
use platform::power::GpioSensorPower;
use platform::sampler::{self, PpiFabric};
use platform::stack::{self, SdStack};
use platform::EVENTS;
use services::Server;

bind_interrupts!(struct Irqs {
    SAADC => saadc::InterruptHandler;
});

type Firmware = App<SdStack, PpiFabric, GpioSensorPower, NeverLow, FlashBondStore>;

static SERVER: StaticCell<Server> = StaticCell::new();
static BONDER: StaticCell<Bonder> = StaticCell::new();

fn softdevice_config() -> nrf_softdevice::Config {
    nrf_softdevice::Config {
        clock: Some(raw::nrf_clock_lf_cfg_t {
            source: raw::NRF_CLOCK_LF_SRC_XTAL as u8,
            rc_ctiv: 0,
            rc_temp_ctiv: 0,
            accuracy: raw::NRF_CLOCK_LF_ACCURACY_20_PPM as u8,
        }),
        conn_gap: Some(raw::ble_gap_conn_cfg_t {
            conn_count: 1,
            event_length: 24,
        }),
        conn_gatt: Some(raw::ble_gatt_conn_cfg_t { att_mtu: 23 }),
        gatts_attr_tab_size: Some(raw::ble_gatts_cfg_attr_tab_size_t {
            attr_tab_size: raw::BLE_GATTS_ATTR_TAB_SIZE_DEFAULT,
        }),
        gap_role_count: Some(raw::ble_gap_cfg_role_count_t {
            adv_set_count: 1,
            periph_role_count: 1,
            central_role_count: 0,
            central_sec_count: 0,
            _bitfield_1: raw::ble_gap_cfg_role_count_t::new_bitfield_1(0),
        }),
        gap_device_name: Some(raw::ble_gap_cfg_device_name_t {
            p_value: DEVICE_NAME.as_ptr() as _,
            current_len: DEVICE_NAME.len() as u16,
            max_len: DEVICE_NAME.len() as u16,
            write_perm: unsafe { mem::zeroed() },
            _bitfield_1: raw::ble_gap_cfg_device_name_t::new_bitfield_1(raw::BLE_GATTS_VLOC_STACK as u8),
        }),
        ..Default::default()
    }
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("Starting {} sensor firmware", DEVICE_NAME);

    // SoftDevice reserves priorities 0, 1 and 4
    let mut nrf_config = Config::default();
    nrf_config.gpiote_interrupt_priority = interrupt::Priority::P2;
    nrf_config.time_interrupt_priority = interrupt::Priority::P2;
    let p = embassy_nrf::init(nrf_config);

    let firmware_config = FirmwareConfig::default();

    let sd = Softdevice::enable(&softdevice_config());
    let server: &'static Server = SERVER.init(
        Server::new(sd).unwrap_or_else(|_| defmt::panic!("Failed to register GATT server")),
    );
    stack::set_preferred_conn_params(&ConnParams::PREFERRED).or_fatal();
    let sd: &'static Softdevice = sd;
    info!("SoftDevice enabled");

    unwrap!(spawner.spawn(stack::softdevice_task(sd)));

    let mut flash = Flash::take(sd);
    bonds::load_bonds(&mut flash).await.or_fatal();
    unwrap!(spawner.spawn(bonds::bond_flush_task(flash)));

    let mut adc_config = saadc::Config::default();
    adc_config.resolution = Resolution::_8BIT;
    let mut channel_config = ChannelConfig::single_ended(p.P0_02);
    channel_config.gain = Gain::GAIN1_6;
    channel_config.reference = Reference::INTERNAL;
    channel_config.time = Time::_40US;
    interrupt::SAADC.set_priority(interrupt::Priority::P3);
    let adc = Saadc::new(p.SAADC, Irqs, adc_config, [channel_config]);
    unwrap!(spawner.spawn(sampler::sampling_task(adc, p.TIMER1, p.PPI_CH0, p.PPI_CH1)));

    // Sensor supply switch on P0.06, analog input on AIN0 (P0.02)
    let power = GpioSensorPower::new(Output::new(p.P0_06, Level::Low, OutputDrive::Standard));
    let mut app: Firmware = App::new(
        firmware_config,
        SdStack::new(server),
        PpiFabric::new(),
        power,
        NeverLow,
        FlashBondStore,
    );

    let bonder: &'static Bonder = BONDER.init(Bonder::new(firmware_config.security));
    unwrap!(spawner.spawn(stack::ble_task(sd, server, bonder)));

    if let Err(err) = app.boot() {
        fatal(err);
    }
    run(&mut app).await
}

/// Application task body: the only consumer of stack events.
async fn run(app: &mut Firmware) -> ! {
    loop {
        let event = match app.context().stack.conn_params_deadline() {
            Some(deadline) => match select(EVENTS.receive(), Timer::at(deadline)).await {
                Either::First(event) => event,
                Either::Second(()) => {
                    app.context_mut().stack.take_conn_params_deadline();
                    AppEvent::ConnParamsTimeout
                }
            },
            None => EVENTS.receive().await,
        };
        if let Err(err) = app.handle(event) {
            fatal(err);
        }
    }
}
