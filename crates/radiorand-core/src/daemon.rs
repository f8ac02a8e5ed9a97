//! Daemon orchestration.
//!
//! Startup is strictly ordered: handshake, tuner settings, initial tune.
//! Only after all three succeed do the hop loop and the FIFO server start,
//! so nothing is ever streamed from an unvalidated or untuned device.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::client::SdrClient;
use crate::conditioning::Whitener;
use crate::config::DaemonConfig;
use crate::device::FifoServer;
use crate::error::{RadioError, Result};
use crate::hopper::{FrequencyHopper, TuningMode, tune_static};
use crate::protocol::DongleInfo;
use crate::shutdown::Shutdown;

const POLL: Duration = Duration::from_millis(250);
const STATUS_EVERY: Duration = Duration::from_secs(60);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// A running entropy daemon.
pub struct Daemon {
    client: Arc<SdrClient>,
    mode: TuningMode,
    errors: Receiver<RadioError>,
    hopper: Option<JoinHandle<Result<()>>>,
    server: JoinHandle<Result<()>>,
    path: PathBuf,
    bytes_written: Arc<AtomicU64>,
    shutdown: Shutdown,
}

/// Connect to the configured server and validate the dongle.
pub fn connect(config: &DaemonConfig) -> Result<SdrClient> {
    let timeout =
        (config.connect_timeout_ms > 0).then(|| Duration::from_millis(config.connect_timeout_ms));
    SdrClient::connect_with_timeout(&config.server, timeout)
}

impl Daemon {
    /// Connect, tune, and start the hop loop and FIFO server.
    ///
    /// Every error here is a startup failure; no thread is left running.
    pub fn start(config: &DaemonConfig, shutdown: Shutdown) -> Result<Self> {
        config.validate()?;

        let client = Arc::new(connect(config)?);
        log::info!("connected to {}: {}", client.peer(), client.info());

        config.tuner.apply(&client)?;

        let mode = TuningMode::from_config(config);
        log::info!("tuning mode: {mode}");
        let hopper = match &mode {
            TuningMode::Static(hz) => {
                tune_static(client.as_ref(), *hz)?;
                None
            }
            TuningMode::Hopping(hop) => {
                let hopper = FrequencyHopper::new(Arc::clone(&client), hop.clone())?;
                let hz = hopper.hop_once(&mut rand::rng())?;
                log::info!("initial frequency {hz} Hz");
                Some(hopper.spawn(shutdown.clone())?)
            }
        };

        let spawned = client.sample_stream().and_then(|samples| {
            let server = FifoServer::from_config(config);
            let bytes_written = server.bytes_written();
            let (tx, rx) = mpsc::channel();
            let handle = server.spawn(Whitener::new(samples), tx, shutdown.clone())?;
            Ok((handle, rx, bytes_written))
        });
        let (server, errors, bytes_written) = match spawned {
            Ok(parts) => parts,
            Err(e) => {
                shutdown.trigger();
                if let Some(h) = hopper {
                    let _ = h.join();
                }
                let _ = client.close();
                return Err(e);
            }
        };

        Ok(Self {
            client,
            mode,
            errors,
            hopper,
            server,
            path: config.path.clone(),
            bytes_written,
            shutdown,
        })
    }

    /// Identity the dongle reported at connect time.
    pub fn info(&self) -> &DongleInfo {
        self.client.info()
    }

    pub fn mode(&self) -> &TuningMode {
        &self.mode
    }

    /// Bytes delivered to FIFO readers so far.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }

    /// Log stream errors until shutdown or until a worker stops, then tear
    /// everything down. A fatal hop-loop error, or the stream server's error
    /// when the sample source closed, is returned.
    pub fn wait(self) -> Result<()> {
        let mut last_status = Instant::now();
        loop {
            match self.errors.recv_timeout(POLL) {
                Ok(e) => log::warn!("stream error: {e}"),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            if self.shutdown.is_triggered()
                || self.server.is_finished()
                || self.hopper.as_ref().is_some_and(|h| h.is_finished())
            {
                break;
            }
            if last_status.elapsed() >= STATUS_EVERY {
                log::info!("{} bytes streamed to {}", self.bytes_written(), self.path.display());
                last_status = Instant::now();
            }
        }
        self.stop()
    }

    fn stop(self) -> Result<()> {
        self.shutdown.trigger();
        // The hopper still writes to the connection; it must be gone first.
        let hop_result = match self.hopper {
            Some(h) => h.join().unwrap_or_else(|_| {
                Err(io::Error::other("hop thread panicked").into())
            }),
            None => Ok(()),
        };
        // Unblocks a server thread waiting on samples.
        if let Err(e) = self.client.close() {
            log::debug!("closing connection: {e}");
        }

        let deadline = Instant::now() + SHUTDOWN_GRACE;
        while !self.server.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(20));
        }
        let server_result = if self.server.is_finished() {
            self.server.join().unwrap_or_else(|_| {
                Err(io::Error::other("stream thread panicked").into())
            })
        } else {
            // A reader holding the pipe open without reading keeps the
            // writer blocked; leave it to process exit.
            log::warn!("stream server still blocked on a reader; removing FIFO");
            if let Err(e) = std::fs::remove_file(&self.path) {
                log::warn!("could not remove {}: {e}", self.path.display());
            }
            Ok(())
        };

        for e in self.errors.try_iter() {
            log::debug!("stream error during shutdown: {e}");
        }
        log::info!(
            "stopped after streaming {} bytes",
            self.bytes_written.load(Ordering::Relaxed)
        );
        hop_result.and(server_result)
    }
}

/// Start the daemon and block until it stops.
pub fn run(config: &DaemonConfig, shutdown: Shutdown) -> Result<()> {
    Daemon::start(config, shutdown)?.wait()
}
