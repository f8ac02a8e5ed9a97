//! Daemon configuration.
//!
//! Built once at startup (CLI flags, optionally layered over a JSON file) and
//! passed by reference into every component.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::client::SdrClient;
use crate::error::{RadioError, Result};

pub const DEFAULT_SERVER: &str = "127.0.0.1:1234";
pub const DEFAULT_PATH: &str = "/dev/rrand";
pub const DEFAULT_BUFFER_SIZE: usize = 4096;

/// Everything the daemon needs to run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// `host:port` of the rtl_tcp server.
    pub server: String,
    /// Fixed tuning frequency in Hz. `None` or 0 selects hopping.
    pub frequency: Option<u32>,
    /// Where the FIFO is created.
    pub path: PathBuf,
    /// Log-only output for running under a service manager.
    pub daemon: bool,
    /// Bytes per FIFO write.
    pub buffer_size: usize,
    /// Connect timeout in milliseconds (0 = OS default).
    pub connect_timeout_ms: u64,
    pub hop: HopConfig,
    pub stream: StreamConfig,
    pub tuner: TunerSettings,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            server: DEFAULT_SERVER.to_string(),
            frequency: None,
            path: PathBuf::from(DEFAULT_PATH),
            daemon: false,
            buffer_size: DEFAULT_BUFFER_SIZE,
            connect_timeout_ms: 0,
            hop: HopConfig::default(),
            stream: StreamConfig::default(),
            tuner: TunerSettings::default(),
        }
    }
}

/// Frequency hopping schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HopConfig {
    pub interval_ms: u64,
    /// Lowest frequency drawn, inclusive.
    pub min_hz: u64,
    /// Highest frequency drawn, exclusive.
    pub max_hz: u64,
    /// Consecutive tuning failures tolerated before the hop loop gives up.
    pub max_failures: u32,
}

impl Default for HopConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            min_hz: 0,
            max_hz: 1_500_000_000,
            max_failures: 3,
        }
    }
}

impl HopConfig {
    /// The draw range must be non-empty and fit the 32-bit frequency field.
    pub fn validate(&self) -> Result<()> {
        if self.interval_ms == 0 {
            return Err(RadioError::Config("hop.interval_ms must be > 0".into()));
        }
        if self.min_hz >= self.max_hz {
            return Err(RadioError::Config(format!(
                "hop range is empty: [{}, {})",
                self.min_hz, self.max_hz
            )));
        }
        if self.max_hz > u64::from(u32::MAX) + 1 {
            return Err(RadioError::Config(format!(
                "hop.max_hz {} exceeds the 32-bit frequency field",
                self.max_hz
            )));
        }
        Ok(())
    }
}

/// Back-off between failed sample reads in the stream server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub retry_initial_ms: u64,
    pub retry_max_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            retry_initial_ms: 100,
            retry_max_ms: 5000,
        }
    }
}

/// Optional tuner parameters applied once after the handshake.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunerSettings {
    pub sample_rate: Option<u32>,
    /// `true` = automatic tuner gain.
    pub gain_mode: Option<bool>,
    /// Tenths of a dB.
    pub gain: Option<u32>,
    /// ppm.
    pub freq_correction: Option<i32>,
    /// `(stage, gain)`.
    pub if_gain: Option<(u16, u16)>,
    pub test_mode: Option<bool>,
    pub agc_mode: Option<bool>,
    pub direct_sampling: Option<bool>,
    pub offset_tuning: Option<bool>,
    pub rtl_xtal: Option<u32>,
    pub tuner_xtal: Option<u32>,
    pub gain_by_index: Option<u32>,
}

impl TunerSettings {
    /// Send every configured setting. Stops at the first failure.
    pub fn apply(&self, client: &SdrClient) -> Result<()> {
        if let Some(hz) = self.sample_rate {
            client.set_sample_rate(hz)?;
        }
        if let Some(automatic) = self.gain_mode {
            client.set_gain_mode(automatic)?;
        }
        if let Some(gain) = self.gain {
            client.set_gain(gain)?;
        }
        if let Some(ppm) = self.freq_correction {
            client.set_freq_correction(ppm)?;
        }
        if let Some((stage, gain)) = self.if_gain {
            client.set_tuner_if_gain(stage, gain)?;
        }
        if let Some(on) = self.test_mode {
            client.set_test_mode(on)?;
        }
        if let Some(on) = self.agc_mode {
            client.set_agc_mode(on)?;
        }
        if let Some(on) = self.direct_sampling {
            client.set_direct_sampling(on)?;
        }
        if let Some(on) = self.offset_tuning {
            client.set_offset_tuning(on)?;
        }
        if let Some(hz) = self.rtl_xtal {
            client.set_rtl_xtal_freq(hz)?;
        }
        if let Some(hz) = self.tuner_xtal {
            client.set_tuner_xtal_freq(hz)?;
        }
        if let Some(idx) = self.gain_by_index {
            client.set_gain_by_index(idx)?;
        }
        Ok(())
    }
}

impl DaemonConfig {
    /// Load a JSON config file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| RadioError::Config(format!("{}: {e}", path.display())))?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| RadioError::Config(format!("{}: {e}", path.display())))?;
        Ok(config)
    }

    /// Fixed frequency, if one was configured.
    pub fn static_frequency(&self) -> Option<u32> {
        self.frequency.filter(|&hz| hz != 0)
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.trim().is_empty() {
            return Err(RadioError::Config("server address is empty".into()));
        }
        if self.path.as_os_str().is_empty() {
            return Err(RadioError::Config("FIFO path is empty".into()));
        }
        if self.buffer_size == 0 {
            return Err(RadioError::Config("buffer_size must be > 0".into()));
        }
        self.hop.validate()?;
        if self.stream.retry_initial_ms == 0
            || self.stream.retry_initial_ms > self.stream.retry_max_ms
        {
            return Err(RadioError::Config(
                "stream retry bounds must satisfy 0 < initial <= max".into(),
            ));
        }
        Ok(())
    }
}
