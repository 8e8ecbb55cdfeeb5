//! SAADC batch sampling driven by TIMER1 through two PPI channels.
//!
//! The first PPI channel routes the timer compare event to the SAADC sample
//! task, the second restarts conversion into the other half of the double
//! buffer when a batch ends. [`PpiFabric`] gates the whole route for the
//! application: enabling wakes [`sampling_task`], disabling drops the
//! running sampler, which stops the timer and releases both channels.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use defmt::{debug, info};
use embassy_futures::select::select;
use embassy_nrf::peripherals::{PPI_CH0, PPI_CH1, TIMER1};
use embassy_nrf::saadc::{CallbackResult, Saadc};
use embassy_nrf::timer::Frequency;
use embassy_nrf::Peri;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;

use parklett_sensor_firmware::ble::events::AppEvent;
use parklett_sensor_firmware::core::config::{SAMPLES_IN_BUFFER, SAMPLE_PERIOD_TICKS};
use parklett_sensor_firmware::core::error::{HalError, OrFatal};
use parklett_sensor_firmware::core::hal::{BatchSampler, ChannelId, TriggerFabric};
use parklett_sensor_firmware::sensor::aggregator::{SampleAggregator, SampleBuffer};

use super::post;

/// Routing slot handed to the trigger. There is exactly one.
const SAMPLE_CHANNEL: ChannelId = ChannelId(0);

static ENABLED: AtomicBool = AtomicBool::new(false);
static PERIOD_TICKS: AtomicU32 = AtomicU32::new(SAMPLE_PERIOD_TICKS);
static START: Signal<CriticalSectionRawMutex, ()> = Signal::new();
static STOP: Signal<CriticalSectionRawMutex, ()> = Signal::new();

/// Gate over the timer/PPI route owned by [`sampling_task`].
#[derive(Default)]
pub struct PpiFabric {
    allocated: bool,
}

impl PpiFabric {
    pub const fn new() -> Self {
        Self { allocated: false }
    }

    fn check(&self, channel: ChannelId) -> Result<(), HalError> {
        if self.allocated && channel == SAMPLE_CHANNEL {
            Ok(())
        } else {
            Err(HalError::ChannelNotAllocated)
        }
    }
}

impl TriggerFabric for PpiFabric {
    fn allocate(&mut self, period_ticks: u32) -> Result<ChannelId, HalError> {
        if self.allocated {
            return Err(HalError::ChannelUnavailable);
        }
        PERIOD_TICKS.store(period_ticks, Ordering::Release);
        self.allocated = true;
        Ok(SAMPLE_CHANNEL)
    }

    fn enable(&mut self, channel: ChannelId) -> Result<(), HalError> {
        self.check(channel)?;
        if !ENABLED.swap(true, Ordering::AcqRel) {
            STOP.reset();
            START.signal(());
        }
        Ok(())
    }

    fn disable(&mut self, channel: ChannelId) -> Result<(), HalError> {
        self.check(channel)?;
        if ENABLED.swap(false, Ordering::AcqRel) {
            START.reset();
            STOP.signal(());
        }
        Ok(())
    }
}

/// Tells the task sampler whether to keep going after a batch. The buffer
/// swap itself is done in hardware through the restart PPI channel.
struct ContinueGate {
    keep_running: bool,
}

impl BatchSampler for ContinueGate {
    fn rearm(&mut self) -> Result<(), HalError> {
        self.keep_running = ENABLED.load(Ordering::Acquire);
        Ok(())
    }
}

#[embassy_executor::task]
pub async fn sampling_task(
    mut saadc: Saadc<'static, 1>,
    mut timer: Peri<'static, TIMER1>,
    mut ppi_sample: Peri<'static, PPI_CH0>,
    mut ppi_restart: Peri<'static, PPI_CH1>,
) -> ! {
    let mut bufs = [[[0i16; 1]; SAMPLES_IN_BUFFER]; 2];
    let mut aggregator = SampleAggregator::new();

    saadc.calibrate().await;
    info!("SAMPLER: SAADC calibrated");

    loop {
        START.wait().await;
        if !ENABLED.load(Ordering::Acquire) {
            continue;
        }
        debug!("SAMPLER: running");

        let sampler = saadc.run_task_sampler(
            timer.reborrow(),
            ppi_sample.reborrow(),
            ppi_restart.reborrow(),
            Frequency::F1MHz,
            PERIOD_TICKS.load(Ordering::Acquire),
            &mut bufs,
            |batch| {
                let mut samples: SampleBuffer = [0; SAMPLES_IN_BUFFER];
                for (dst, src) in samples.iter_mut().zip(batch) {
                    *dst = src[0];
                }
                let mut gate = ContinueGate { keep_running: false };
                let reading = aggregator
                    .on_batch_complete(&mut gate, &samples[..batch.len()])
                    .or_fatal();
                post(AppEvent::Reading(reading));
                if gate.keep_running {
                    CallbackResult::Continue
                } else {
                    CallbackResult::Stop
                }
            },
        );
        select(sampler, STOP.wait()).await;
        debug!("SAMPLER: stopped after {} batches", aggregator.batches());
    }
}
