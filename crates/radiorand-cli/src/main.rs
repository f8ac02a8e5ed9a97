//! CLI for radiorand: an RTL-SDR tuner as a system entropy device.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use commands::{TunerArgs, parse_frequency};

#[derive(Parser)]
#[command(name = "radiorand")]
#[command(about = "radiorand: whitened RF noise from an rtl_tcp tuner, served on a named pipe")]
#[command(version = radiorand_core::VERSION)]
struct Cli {
    /// Log at debug level (RUST_LOG overrides)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the entropy daemon: tune, whiten, and feed the FIFO until stopped
    Serve {
        /// Address of the rtl_tcp server [default: 127.0.0.1:1234]
        #[arg(long)]
        server: Option<String>,

        /// Static frequency (e.g. 100M, 1.2G). Unset or 0 hops randomly every interval.
        #[arg(long, value_parser = parse_frequency)]
        freq: Option<u32>,

        /// FIFO path [default: /dev/rrand]
        #[arg(long)]
        path: Option<PathBuf>,

        /// Log-only output, for running under a service manager
        #[arg(long)]
        daemon: bool,

        /// JSON config file; flags given on the command line take precedence
        #[arg(long)]
        config: Option<PathBuf>,

        /// Bytes per FIFO write [default: 4096]
        #[arg(long)]
        buffer_size: Option<usize>,

        /// Milliseconds between frequency hops [default: 1000]
        #[arg(long)]
        hop_interval_ms: Option<u64>,

        #[command(flatten)]
        tuner: TunerArgs,
    },

    /// Connect, print the dongle identity, and exit
    Info {
        /// Address of the rtl_tcp server
        #[arg(long, default_value = radiorand_core::config::DEFAULT_SERVER)]
        server: String,
    },

    /// Write whitened bytes to stdout (pipe-friendly)
    Stream {
        /// Address of the rtl_tcp server
        #[arg(long, default_value = radiorand_core::config::DEFAULT_SERVER)]
        server: String,

        /// Tune to this frequency first (e.g. 100M); otherwise leave the tuner as is
        #[arg(long, value_parser = parse_frequency)]
        freq: Option<u32>,

        /// Output format
        #[arg(long, default_value = "raw", value_parser = ["raw", "hex"])]
        format: String,

        /// Total bytes (0 = infinite)
        #[arg(long, default_value = "0")]
        bytes: usize,
    },
}

fn main() {
    let cli = Cli::parse();
    commands::init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Serve {
            server,
            freq,
            path,
            daemon,
            config,
            buffer_size,
            hop_interval_ms,
            tuner,
        } => commands::serve::run(commands::serve::ServeCommandConfig {
            server,
            freq,
            path,
            daemon,
            config_path: config,
            buffer_size,
            hop_interval_ms,
            tuner,
        }),
        Commands::Info { server } => commands::info::run(&server),
        Commands::Stream {
            server,
            freq,
            format,
            bytes,
        } => commands::stream::run(&server, freq, &format, bytes),
    };

    if let Err(e) = result {
        log::error!("{e}");
        std::process::exit(1);
    }
}
