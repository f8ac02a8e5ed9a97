//! Named-pipe entropy device.
//!
//! [`FifoServer`] creates a FIFO and copies whitened bytes into it for as
//! long as the daemon runs. Opening the write end waits until a reader
//! attaches and every write blocks while the reader is behind, so an idle
//! consumer throttles sample consumption instead of growing a buffer.
//!
//! ```text
//! Uninitialized ─► FifoCreated ─► Streaming ◄─► (error reported) Streaming
//! ```
//!
//! A failed source read is reported and retried after a bounded back-off; a
//! failed write (the reader went away) is reported and the FIFO is
//! re-opened, which waits for the next reader. The one terminal error is a
//! source at end of stream: there is nothing left to serve, so the FIFO is
//! removed and the error returned.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::Sender;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rand::TryRngCore;

use crate::config::{DaemonConfig, StreamConfig};
use crate::error::{RadioError, Result};
use crate::shutdown::Shutdown;

/// Permission bits of the FIFO: owner read/write, group and other read.
pub const FIFO_MODE: u32 = 0o644;

/// How often a writer with no reader re-checks for one.
const READER_POLL: Duration = Duration::from_millis(50);

/// Streams a randomness source into a named pipe.
#[derive(Debug)]
pub struct FifoServer {
    path: PathBuf,
    buffer_size: usize,
    retry: StreamConfig,
    bytes_written: Arc<AtomicU64>,
}

impl FifoServer {
    pub fn new(path: impl Into<PathBuf>, buffer_size: usize, retry: StreamConfig) -> Self {
        Self {
            path: path.into(),
            buffer_size: buffer_size.max(1),
            retry,
            bytes_written: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn from_config(config: &DaemonConfig) -> Self {
        Self::new(&config.path, config.buffer_size, config.stream.clone())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Shared counter of bytes delivered to readers.
    pub fn bytes_written(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.bytes_written)
    }

    /// Delete whatever is at the path and create a fresh FIFO.
    pub fn create_fifo(&self) -> Result<()> {
        remove_existing(&self.path)?;
        mkfifo(&self.path)?;
        log::info!("created FIFO {}", self.path.display());
        Ok(())
    }

    /// Create the FIFO and stream `source` into it until shutdown.
    ///
    /// Returns early when the FIFO cannot be created or opened, or with the
    /// source's error once it reports end of stream. The FIFO is removed on
    /// every return after it was created.
    pub fn serve<S>(
        &self,
        source: &mut S,
        errors: &Sender<RadioError>,
        shutdown: &Shutdown,
    ) -> Result<()>
    where
        S: TryRngCore<Error = RadioError> + ?Sized,
    {
        self.create_fifo()?;

        let result = self.stream(source, errors, shutdown);

        if let Err(e) = remove_existing(&self.path) {
            log::warn!("could not remove {}: {e}", self.path.display());
        }
        log::info!(
            "stream server stopped after {} bytes",
            self.bytes_written.load(Ordering::Relaxed)
        );
        result
    }

    /// Copy loop over an existing FIFO. The sink is closed on return.
    fn stream<S>(
        &self,
        source: &mut S,
        errors: &Sender<RadioError>,
        shutdown: &Shutdown,
    ) -> Result<()>
    where
        S: TryRngCore<Error = RadioError> + ?Sized,
    {
        let initial = Duration::from_millis(self.retry.retry_initial_ms);
        let max = Duration::from_millis(self.retry.retry_max_ms);
        let mut backoff = initial;
        let mut buf = vec![0u8; self.buffer_size];
        let mut sink: Option<File> = None;

        while !shutdown.is_triggered() {
            if sink.is_none() {
                match self.open_writer(shutdown)? {
                    Some(fifo) => {
                        log::info!("reader attached to {}", self.path.display());
                        sink = Some(fifo);
                    }
                    None => break,
                }
            }

            if let Err(e) = source.try_fill_bytes(&mut buf) {
                // Closing the connection is how the daemon wakes this thread.
                if shutdown.is_triggered() {
                    break;
                }
                if e.is_source_closed() {
                    log::error!("sample source closed: {e}");
                    return Err(e);
                }
                log::debug!("source read failed, retrying in {backoff:?}");
                report(errors, e);
                if shutdown.wait_timeout(backoff) {
                    break;
                }
                backoff = (backoff * 2).min(max);
                continue;
            }
            backoff = initial;

            let Some(fifo) = sink.as_mut() else {
                continue;
            };
            match fifo.write_all(&buf) {
                Ok(()) => {
                    self.bytes_written
                        .fetch_add(buf.len() as u64, Ordering::Relaxed);
                }
                Err(e) => {
                    log::debug!("write to {} failed, re-opening", self.path.display());
                    report(errors, e.into());
                    sink = None;
                }
            }
        }
        Ok(())
    }

    /// Run [`FifoServer::serve`] on its own thread.
    pub fn spawn<S>(
        self,
        mut source: S,
        errors: Sender<RadioError>,
        shutdown: Shutdown,
    ) -> io::Result<JoinHandle<Result<()>>>
    where
        S: TryRngCore<Error = RadioError> + Send + 'static,
    {
        thread::Builder::new()
            .name("radiorand-fifo".into())
            .spawn(move || self.serve(&mut source, &errors, &shutdown))
    }

    /// Open the write end once a reader is attached.
    ///
    /// Polls with `O_NONBLOCK` so a pending shutdown is noticed; returns
    /// `None` if shutdown arrives first. The returned file is blocking.
    #[cfg(unix)]
    fn open_writer(&self, shutdown: &Shutdown) -> Result<Option<File>> {
        use std::os::unix::fs::OpenOptionsExt;

        loop {
            let opened = OpenOptions::new()
                .write(true)
                .custom_flags(libc::O_NONBLOCK)
                .open(&self.path);
            match opened {
                Ok(file) => {
                    set_blocking(&file)?;
                    return Ok(Some(file));
                }
                // No reader yet.
                Err(e) if e.raw_os_error() == Some(libc::ENXIO) => {
                    if shutdown.wait_timeout(READER_POLL) {
                        return Ok(None);
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
    }

    #[cfg(not(unix))]
    fn open_writer(&self, _shutdown: &Shutdown) -> Result<Option<File>> {
        Ok(Some(OpenOptions::new().write(true).open(&self.path)?))
    }
}

fn report(errors: &Sender<RadioError>, err: RadioError) {
    if let Err(unsent) = errors.send(err) {
        log::warn!("stream error (no listener): {}", unsent.0);
    }
}

fn remove_existing(path: &Path) -> Result<()> {
    let result = match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) => Err(e),
    };
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(unix)]
fn mkfifo(path: &Path) -> Result<()> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|e| RadioError::Io(io::Error::new(io::ErrorKind::InvalidInput, e)))?;
    // SAFETY: c_path is a valid NUL-terminated CString that outlives the call.
    let ret = unsafe { libc::mkfifo(c_path.as_ptr(), FIFO_MODE as libc::mode_t) };
    if ret != 0 {
        return Err(io::Error::last_os_error().into());
    }
    Ok(())
}

#[cfg(unix)]
fn set_blocking(file: &File) -> Result<()> {
    use std::os::unix::io::AsRawFd;

    let fd = file.as_raw_fd();
    // SAFETY: fd is an open descriptor owned by `file` for the whole call.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error().into());
    }
    // SAFETY: same descriptor; only the O_NONBLOCK status flag is cleared.
    let ret = unsafe { libc::fcntl(fd, libc::F_SETFL, flags & !libc::O_NONBLOCK) };
    if ret < 0 {
        return Err(io::Error::last_os_error().into());
    }
    Ok(())
}

#[cfg(not(unix))]
fn mkfifo(_path: &Path) -> Result<()> {
    Err(io::Error::new(io::ErrorKind::Unsupported, "named pipes not supported on this platform").into())
}
