use std::path::PathBuf;

use radiorand_core::{Daemon, DaemonConfig, Result, Shutdown};

use super::TunerArgs;

pub struct ServeCommandConfig {
    pub server: Option<String>,
    pub freq: Option<u32>,
    pub path: Option<PathBuf>,
    pub daemon: bool,
    pub config_path: Option<PathBuf>,
    pub buffer_size: Option<usize>,
    pub hop_interval_ms: Option<u64>,
    pub tuner: TunerArgs,
}

impl ServeCommandConfig {
    /// Start from the config file (or defaults) and overlay explicit flags.
    fn build(&self) -> Result<DaemonConfig> {
        let mut config = match &self.config_path {
            Some(path) => DaemonConfig::load(path)?,
            None => DaemonConfig::default(),
        };
        if let Some(server) = &self.server {
            config.server = server.clone();
        }
        if self.freq.is_some() {
            config.frequency = self.freq;
        }
        if let Some(path) = &self.path {
            config.path = path.clone();
        }
        if self.daemon {
            config.daemon = true;
        }
        if let Some(size) = self.buffer_size {
            config.buffer_size = size;
        }
        if let Some(ms) = self.hop_interval_ms {
            config.hop.interval_ms = ms;
        }
        self.tuner.apply_to(&mut config.tuner);
        config.validate()?;
        Ok(config)
    }
}

pub fn run(cmd: ServeCommandConfig) -> Result<()> {
    let config = cmd.build()?;

    let shutdown = Shutdown::new();
    let on_signal = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || on_signal.trigger()) {
        log::warn!("could not install signal handler: {e}");
    }

    let daemon = Daemon::start(&config, shutdown)?;
    if !config.daemon {
        println!("{}", daemon.info());
        println!(
            "Feeding entropy to {} ({}, buffer={}B)",
            config.path.display(),
            daemon.mode(),
            config.buffer_size
        );
        println!("Press Ctrl+C to stop.");
    }
    daemon.wait()
}
