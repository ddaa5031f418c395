//! Smoothed PIR motion sensor.
//!
//! A raw PIR output is noisy, so the pin is sampled at a fixed rate into a
//! short queue and motion is only reported once the average of that queue
//! rises above a threshold.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::PortraitError;

/// Source of a polled "motion currently detected" signal
pub trait MotionSensor {
    /// Whether the sensor currently reports motion
    fn motion_detected(&self) -> bool;

    /// Smoothed sensor value in `[0, 1]`, `None` until enough samples exist
    fn value(&self) -> Option<f64>;
}

/// A single digital input line
pub trait DigitalInput {
    fn is_high(&mut self) -> bool;
}

pub const DEFAULT_PIR_PIN: u8 = 4;
pub const DEFAULT_QUEUE_LEN: usize = 10;
/// Hz
pub const DEFAULT_SAMPLE_RATE: f64 = 10.0;
pub const DEFAULT_THRESHOLD: f64 = 0.75;

/// PIR sampling parameters
#[derive(Debug, Clone, PartialEq)]
pub struct SensorSettings {
    /// BCM pin number the sensor output is wired to
    pub pin: u8,
    /// Number of samples averaged together
    pub queue_len: usize,
    /// Samples taken per second
    pub sample_rate: f64,
    /// Fraction of high samples above which motion is reported
    pub threshold: f64,
}

impl Default for SensorSettings {
    fn default() -> Self {
        Self {
            pin: DEFAULT_PIR_PIN,
            queue_len: DEFAULT_QUEUE_LEN,
            sample_rate: DEFAULT_SAMPLE_RATE,
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

impl SensorSettings {
    /// Check that the settings describe a usable sampler
    pub fn validate(&self) -> Result<(), PortraitError> {
        if self.queue_len == 0 {
            return Err(PortraitError::InvalidConfig(
                "sensor queue length must be at least 1".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.threshold) {
            return Err(PortraitError::InvalidConfig(format!(
                "sensor threshold must be in [0, 1), got {}",
                self.threshold
            )));
        }
        self.sample_period().map(|_| ())
    }

    /// Time between two samples
    pub fn sample_period(&self) -> Result<Duration, PortraitError> {
        if !self.sample_rate.is_finite() || self.sample_rate <= 0.0 {
            return Err(PortraitError::InvalidConfig(format!(
                "sensor sample rate must be positive, got {}",
                self.sample_rate
            )));
        }
        Duration::try_from_secs_f64(1.0 / self.sample_rate).map_err(|e| {
            PortraitError::InvalidConfig(format!(
                "sensor sample rate {} is out of range: {}",
                self.sample_rate, e
            ))
        })
    }
}

/// Fixed-length queue of boolean samples
#[derive(Debug, Clone)]
pub struct SampleWindow {
    samples: VecDeque<bool>,
    capacity: usize,
    threshold: f64,
}

impl SampleWindow {
    pub fn new(capacity: usize, threshold: f64) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            threshold,
        }
    }

    /// Record a sample, evicting the oldest one once full
    pub fn push(&mut self, high: bool) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(high);
    }

    pub fn is_full(&self) -> bool {
        self.samples.len() == self.capacity
    }

    /// Mean of the queued samples; `None` until the queue has filled
    pub fn value(&self) -> Option<f64> {
        if !self.is_full() {
            return None;
        }
        let high = self.samples.iter().filter(|&&s| s).count();
        Some(high as f64 / self.capacity as f64)
    }

    pub fn is_active(&self) -> bool {
        self.value().is_some_and(|v| v > self.threshold)
    }
}

/// Motion sensor backed by a background sampling thread
pub struct PirSensor {
    window: Arc<Mutex<SampleWindow>>,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl PirSensor {
    /// Start sampling `pin` according to `settings`
    pub fn start<P>(mut pin: P, settings: &SensorSettings) -> Result<Self, PortraitError>
    where
        P: DigitalInput + Send + 'static,
    {
        settings.validate()?;
        let period = settings.sample_period()?;

        let window = Arc::new(Mutex::new(SampleWindow::new(
            settings.queue_len,
            settings.threshold,
        )));
        let running = Arc::new(AtomicBool::new(true));

        let worker_window = Arc::clone(&window);
        let worker_running = Arc::clone(&running);
        let worker = thread::Builder::new()
            .name("pir-sampler".to_string())
            .spawn(move || {
                while worker_running.load(Ordering::Acquire) {
                    let high = pin.is_high();
                    if let Ok(mut window) = worker_window.lock() {
                        window.push(high);
                    }
                    thread::park_timeout(period);
                }
                log::debug!("PIR sampler stopped");
            })
            .map_err(|e| PortraitError::Sensor(format!("failed to spawn sampler: {}", e)))?;

        log::info!(
            "PIR sensor sampling pin {} at {} Hz (queue: {}, threshold: {})",
            settings.pin,
            settings.sample_rate,
            settings.queue_len,
            settings.threshold
        );

        Ok(Self {
            window,
            running,
            worker: Some(worker),
        })
    }
}

impl MotionSensor for PirSensor {
    fn motion_detected(&self) -> bool {
        self.window
            .lock()
            .map(|window| window.is_active())
            .unwrap_or(false)
    }

    fn value(&self) -> Option<f64> {
        self.window.lock().ok().and_then(|window| window.value())
    }
}

impl Drop for PirSensor {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            worker.thread().unpark();
            if worker.join().is_err() {
                log::warn!("PIR sampler thread panicked");
            }
        }
    }
}

#[cfg(feature = "gpio")]
mod gpio {
    use super::{DigitalInput, PirSensor, SensorSettings};
    use crate::PortraitError;
    use rppal::gpio::{Gpio, InputPin};

    impl DigitalInput for InputPin {
        fn is_high(&mut self) -> bool {
            InputPin::is_high(self)
        }
    }

    /// Open the configured BCM pin and start sampling it
    pub fn open_pir(settings: &SensorSettings) -> Result<PirSensor, PortraitError> {
        let gpio = Gpio::new()
            .map_err(|e| PortraitError::Sensor(format!("failed to open GPIO: {}", e)))?;
        let pin = gpio
            .get(settings.pin)
            .map_err(|e| {
                PortraitError::Sensor(format!("failed to claim pin {}: {}", settings.pin, e))
            })?
            .into_input();

        PirSensor::start(pin, settings)
    }
}

#[cfg(feature = "gpio")]
pub use gpio::open_pir;

/// Stub when GPIO support is disabled
#[cfg(not(feature = "gpio"))]
pub fn open_pir(_settings: &SensorSettings) -> Result<PirSensor, PortraitError> {
    Err(PortraitError::Sensor(
        "GPIO support not compiled in".to_string(),
    ))
}
