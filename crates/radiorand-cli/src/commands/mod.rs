pub mod info;
pub mod serve;
pub mod stream;

use clap::Args;
use radiorand_core::TunerSettings;

/// Tuner parameters applied once after the handshake.
#[derive(Args, Debug, Default)]
pub struct TunerArgs {
    /// Sample rate (e.g. 2.4M)
    #[arg(long, value_parser = parse_frequency)]
    pub sample_rate: Option<u32>,

    /// Automatic tuner gain (true) or manual (false)
    #[arg(long)]
    pub gain_mode: Option<bool>,

    /// Tuner gain in dB (e.g. 19.7)
    #[arg(long)]
    pub gain: Option<f64>,

    /// Frequency correction in ppm
    #[arg(long, allow_hyphen_values = true)]
    pub freq_correction: Option<i32>,

    /// Enable or disable test mode
    #[arg(long)]
    pub test_mode: Option<bool>,

    /// Enable or disable RTL2832 AGC
    #[arg(long)]
    pub agc_mode: Option<bool>,

    /// Enable or disable direct sampling
    #[arg(long)]
    pub direct_sampling: Option<bool>,

    /// Enable or disable offset tuning
    #[arg(long)]
    pub offset_tuning: Option<bool>,

    /// RTL2832 crystal frequency (e.g. 28.8M)
    #[arg(long, value_parser = parse_frequency)]
    pub rtl_xtal: Option<u32>,

    /// Tuner crystal frequency (e.g. 28.8M)
    #[arg(long, value_parser = parse_frequency)]
    pub tuner_xtal: Option<u32>,

    /// Select a gain step by index (0..=gain count)
    #[arg(long)]
    pub gain_by_index: Option<u32>,
}

impl TunerArgs {
    /// Overlay every flag that was given onto `settings`.
    pub fn apply_to(&self, settings: &mut TunerSettings) {
        if self.sample_rate.is_some() {
            settings.sample_rate = self.sample_rate;
        }
        if self.gain_mode.is_some() {
            settings.gain_mode = self.gain_mode;
        }
        if let Some(db) = self.gain {
            settings.gain = Some((db * 10.0).round().max(0.0) as u32);
        }
        if self.freq_correction.is_some() {
            settings.freq_correction = self.freq_correction;
        }
        if self.test_mode.is_some() {
            settings.test_mode = self.test_mode;
        }
        if self.agc_mode.is_some() {
            settings.agc_mode = self.agc_mode;
        }
        if self.direct_sampling.is_some() {
            settings.direct_sampling = self.direct_sampling;
        }
        if self.offset_tuning.is_some() {
            settings.offset_tuning = self.offset_tuning;
        }
        if self.rtl_xtal.is_some() {
            settings.rtl_xtal = self.rtl_xtal;
        }
        if self.tuner_xtal.is_some() {
            settings.tuner_xtal = self.tuner_xtal;
        }
        if self.gain_by_index.is_some() {
            settings.gain_by_index = self.gain_by_index;
        }
    }
}

/// Parse a frequency with an optional SI suffix: `100M`, `2.4M`, `1.2G`,
/// `433920k`, or plain Hz.
pub fn parse_frequency(s: &str) -> Result<u32, String> {
    let s = s.trim();
    let (mantissa, scale) = match s.chars().last() {
        Some('k') | Some('K') => (&s[..s.len() - 1], 1e3),
        Some('M') => (&s[..s.len() - 1], 1e6),
        Some('G') => (&s[..s.len() - 1], 1e9),
        _ => (s, 1.0),
    };
    let value: f64 = mantissa
        .parse()
        .map_err(|_| format!("invalid frequency '{s}'"))?;
    let hz = (value * scale).round();
    if !(0.0..=f64::from(u32::MAX)).contains(&hz) {
        return Err(format!("frequency '{s}' does not fit in 32 bits"));
    }
    Ok(hz as u32)
}

/// Initialize env_logger at `info`, or `debug` with `--verbose`.
pub fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp_millis()
        .init();
}
