//! Error type shared by every radiorand component.

use std::io;

/// Errors returned by the protocol client, extractor, and stream server.
#[derive(Debug, thiserror::Error)]
pub enum RadioError {
    /// The rtl_tcp server could not be reached.
    #[error("error connecting to spectrum server: {0}")]
    Connection(#[source] io::Error),

    /// The handshake record was short or malformed.
    #[error("error getting dongle information: {0}")]
    Protocol(String),

    /// The remote end is not an rtl_tcp dongle.
    #[error("invalid magic number: expected {expected:?} received {received:?}")]
    Validation {
        expected: String,
        received: String,
    },

    /// A command parameter is outside what the session allows.
    #[error("{what} out of range: {value} (max {max})")]
    Range {
        what: &'static str,
        value: u32,
        max: u32,
    },

    /// Read or write failure on the connection or the FIFO.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Invalid configuration value or file.
    #[error("configuration error: {0}")]
    Config(String),

    /// The hop loop gave up after repeated tuning failures.
    #[error("tuner stopped accepting commands after {failures} attempts: {last}")]
    Tuning {
        failures: u32,
        #[source]
        last: Box<RadioError>,
    },
}

impl RadioError {
    /// True when the error came from the sink side losing its reader.
    pub fn is_broken_pipe(&self) -> bool {
        matches!(self, Self::Io(e) if e.kind() == io::ErrorKind::BrokenPipe)
    }

    /// True when the sample stream hit end of file (the server went away).
    pub fn is_source_closed(&self) -> bool {
        matches!(self, Self::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof)
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, RadioError>;
