//! # radiorand-core
//!
//! **An RTL-SDR tuner as a system entropy device.**
//!
//! `radiorand-core` speaks the `rtl_tcp` protocol to a remote tuner, keeps it
//! hopping across the spectrum, whitens the raw I/Q byte stream with a
//! two-pass hash/XOR construction, and serves the result on a named pipe.
//!
//! ## Quick Start
//!
//! ```no_run
//! use radiorand_core::{DaemonConfig, Shutdown, daemon};
//!
//! let config = DaemonConfig {
//!     path: "/tmp/rrand".into(),
//!     ..Default::default()
//! };
//! daemon::run(&config, Shutdown::new())?;
//! # Ok::<(), radiorand_core::RadioError>(())
//! ```
//!
//! ## Architecture
//!
//! ```text
//! rtl_tcp ─► SdrClient ─► SampleStream ─► Whitener ─► FifoServer ─► readers
//!               ▲
//!               └── FrequencyHopper (commands, own thread)
//! ```
//!
//! Commands and samples use the two directions of one TCP connection; the
//! client hands out a read-only [`SampleStream`] so the hop loop's writes
//! never interleave with sample reads.
//!
//! This is a best-effort whitener for feeding an entropy pool. It performs
//! no statistical health testing and is not a certified randomness source.

pub mod client;
pub mod conditioning;
pub mod config;
pub mod daemon;
pub mod device;
pub mod error;
pub mod hopper;
pub mod protocol;
pub mod shutdown;

pub use client::{SampleStream, SdrClient};
pub use conditioning::{Whitener, whiten};
pub use config::{DaemonConfig, HopConfig, StreamConfig, TunerSettings};
pub use daemon::Daemon;
pub use device::FifoServer;
pub use error::{RadioError, Result};
pub use hopper::{FrequencyHopper, Tune, TuningMode};
pub use protocol::{Command, CommandMessage, DONGLE_MAGIC, DongleInfo, Tuner};
pub use shutdown::Shutdown;

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
