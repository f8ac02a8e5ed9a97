//! Frequency control: one fixed frequency, or a perpetual random hop.
//!
//! Re-tuning moves the receiver across unrelated parts of the spectrum so
//! successive sample windows do not share the same interferers.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rand::Rng;

use crate::client::SdrClient;
use crate::config::{DaemonConfig, HopConfig};
use crate::error::{RadioError, Result};
use crate::shutdown::Shutdown;

/// Anything that accepts a center frequency.
pub trait Tune: Send + Sync {
    fn tune(&self, hz: u32) -> Result<()>;
}

impl Tune for SdrClient {
    fn tune(&self, hz: u32) -> Result<()> {
        self.set_center_freq(hz)
    }
}

/// How the receiver is tuned for the lifetime of the daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TuningMode {
    Static(u32),
    Hopping(HopConfig),
}

impl TuningMode {
    pub fn from_config(config: &DaemonConfig) -> Self {
        match config.static_frequency() {
            Some(hz) => Self::Static(hz),
            None => Self::Hopping(config.hop.clone()),
        }
    }
}

impl std::fmt::Display for TuningMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Static(hz) => write!(f, "static {hz} Hz"),
            Self::Hopping(hop) => write!(
                f,
                "hopping [{}, {}) Hz every {} ms",
                hop.min_hz, hop.max_hz, hop.interval_ms
            ),
        }
    }
}

/// Random hop loop over a tuner.
pub struct FrequencyHopper<T: Tune + ?Sized> {
    tuner: Arc<T>,
    config: HopConfig,
}

impl<T: Tune + ?Sized + 'static> FrequencyHopper<T> {
    /// Fails with [`RadioError::Config`] if `config` has an empty range.
    pub fn new(tuner: Arc<T>, config: HopConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { tuner, config })
    }

    /// Draw a frequency uniformly from `[min_hz, max_hz)`.
    pub fn pick<R: Rng>(&self, rng: &mut R) -> u32 {
        let hz = rng.random_range(self.config.min_hz..self.config.max_hz);
        u32::try_from(hz).unwrap_or(u32::MAX)
    }

    /// Retune once to a fresh random frequency.
    pub fn hop_once<R: Rng>(&self, rng: &mut R) -> Result<u32> {
        let hz = self.pick(rng);
        self.tuner.tune(hz)?;
        Ok(hz)
    }

    /// Hop once per interval until shutdown.
    ///
    /// The loop waits one interval before its first hop; tuning at startup
    /// is left to the caller. A failed hop is retried on the next tick.
    /// After `max_failures` consecutive failures the loop stops with
    /// [`RadioError::Tuning`].
    pub fn run(&self, shutdown: &Shutdown) -> Result<()> {
        let mut rng = rand::rng();
        let interval = Duration::from_millis(self.config.interval_ms);
        let budget = self.config.max_failures.max(1);
        let mut failures = 0u32;

        while !shutdown.wait_timeout(interval) {
            match self.hop_once(&mut rng) {
                Ok(hz) => {
                    failures = 0;
                    log::debug!("tuned to {hz} Hz");
                }
                // A hop racing shutdown is not a tuner fault.
                Err(e) if shutdown.is_triggered() => {
                    log::debug!("hop interrupted by shutdown: {e}");
                    break;
                }
                Err(e) => {
                    failures += 1;
                    if failures >= budget {
                        log::error!("hop failed {failures} times in a row, giving up: {e}");
                        return Err(RadioError::Tuning {
                            failures,
                            last: Box::new(e),
                        });
                    }
                    log::warn!("hop failed ({failures}/{budget}): {e}");
                }
            }
        }
        Ok(())
    }

    /// Run the hop loop on its own thread.
    pub fn spawn(self, shutdown: Shutdown) -> std::io::Result<JoinHandle<Result<()>>> {
        thread::Builder::new()
            .name("radiorand-hopper".into())
            .spawn(move || self.run(&shutdown))
    }
}

/// Tune once and leave the receiver there.
pub fn tune_static<T: Tune + ?Sized>(tuner: &T, hz: u32) -> Result<()> {
    tuner.tune(hz)?;
    log::info!("tuned to static frequency {hz} Hz");
    Ok(())
}
