//! Integration tests for radiorand-core.
//!
//! A loopback `TcpListener` plays the rtl_tcp server: it sends a handshake
//! record, optionally streams sample bytes, and records every command byte
//! the client writes.

use std::io::{Read, Write};
use std::net::TcpListener;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use radiorand_core::{Command, RadioError, SdrClient, Tuner, Whitener};

const R820T_HANDSHAKE: [u8; 12] = [b'R', b'T', b'L', b'0', 0, 0, 0, 5, 0, 0, 0, 10];

struct MockServer {
    addr: String,
    handle: JoinHandle<Vec<u8>>,
}

impl MockServer {
    /// Accept one client, send `handshake`, stream `sample` forever if given,
    /// and return every byte the client sent once it disconnects.
    fn start(handshake: [u8; 12], sample: Option<u8>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let handle = thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            conn.write_all(&handshake).unwrap();
            if let Some(value) = sample {
                let mut writer = conn.try_clone().unwrap();
                thread::spawn(move || {
                    let chunk = [value; 4096];
                    while writer.write_all(&chunk).is_ok() {}
                });
            }
            let mut received = Vec::new();
            let _ = conn.read_to_end(&mut received);
            received
        });
        Self { addr, handle }
    }

    fn received(self) -> Vec<u8> {
        self.handle.join().unwrap()
    }
}

#[test]
fn handshake_reports_r820t_identity() {
    let server = MockServer::start(R820T_HANDSHAKE, None);
    let client = SdrClient::connect(&server.addr).unwrap();
    assert_eq!(client.info().tuner, Tuner::R820T);
    assert_eq!(client.info().gain_count, 10);
    assert_eq!(client.info().tuner.to_string(), "R820T");
    drop(client);
    assert!(server.received().is_empty());
}

#[test]
fn gain_by_index_is_bounded_by_gain_count() {
    let server = MockServer::start(R820T_HANDSHAKE, None);
    let client = SdrClient::connect(&server.addr).unwrap();

    client.set_gain_by_index(5).unwrap();
    let err = client.set_gain_by_index(15).unwrap_err();
    assert!(
        matches!(err, RadioError::Range { value: 15, max: 10, .. }),
        "{err:?}"
    );

    drop(client);
    assert_eq!(
        server.received(),
        vec![Command::GainByIndex.opcode(), 0x00, 0x00, 0x00, 0x05]
    );
}

#[test]
fn bad_magic_is_rejected_and_connection_closed() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let server = thread::spawn(move || {
        let (mut conn, _) = listener.accept().unwrap();
        conn.write_all(b"HTTP\0\0\0\x05\0\0\0\x0a").unwrap();
        conn.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let mut buf = [0u8; 1];
        // Zero means the client closed its end.
        conn.read(&mut buf).unwrap()
    });

    let err = SdrClient::connect(&addr).unwrap_err();
    match err {
        RadioError::Validation { expected, received } => {
            assert_eq!(expected, "RTL0");
            assert_eq!(received, "HTTP");
        }
        other => panic!("expected validation error, got {other:?}"),
    }
    assert_eq!(server.join().unwrap(), 0);
}

#[test]
fn whitened_zero_samples_are_not_zero() {
    let server = MockServer::start(R820T_HANDSHAKE, Some(0));
    let client = SdrClient::connect(&server.addr).unwrap();
    let mut whitener = Whitener::new(client.sample_stream().unwrap());

    let mut buf = [0u8; 64];
    let n = whitener.read(&mut buf).unwrap();
    assert!(n > 0);
    assert!(buf[..n].iter().any(|&b| b != 0));

    // Constant input still yields a usable integer rather than an error.
    whitener.next_u64().unwrap();

    client.close().unwrap();
    drop(whitener);
    drop(client);
    let _ = server.received();
}

#[test]
fn commands_interleave_safely_with_sample_reads() {
    let server = MockServer::start(R820T_HANDSHAKE, Some(0x5A));
    let client = SdrClient::connect(&server.addr).unwrap();
    let mut samples = client.sample_stream().unwrap();

    let reader = thread::spawn(move || {
        let mut total = 0usize;
        let mut buf = [0u8; 4096];
        while total < 1 << 20 {
            let n = samples.read(&mut buf).unwrap();
            assert!(buf[..n].iter().all(|&b| b == 0x5A));
            total += n;
        }
        total
    });
    for hz in 0..50u32 {
        client.set_center_freq(100_000_000 + hz).unwrap();
    }
    assert!(reader.join().unwrap() >= 1 << 20);

    client.close().unwrap();
    drop(client);
    let received = server.received();
    assert_eq!(received.len(), 50 * 5);
    assert!(received.chunks(5).all(|c| c[0] == Command::CenterFreq.opcode()));
}

#[cfg(unix)]
mod daemon {
    use super::*;
    use std::fs::File;

    use radiorand_core::{Daemon, DaemonConfig, HopConfig, Shutdown, TunerSettings, TuningMode};

    fn config_for(addr: &str, dir: &tempfile::TempDir) -> DaemonConfig {
        DaemonConfig {
            server: addr.to_string(),
            frequency: Some(100_000_000),
            path: dir.path().join("rrand"),
            buffer_size: 512,
            tuner: TunerSettings {
                gain_by_index: Some(3),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn hopping_config_for(addr: &str, dir: &tempfile::TempDir, max_failures: u32) -> DaemonConfig {
        DaemonConfig {
            server: addr.to_string(),
            frequency: None,
            path: dir.path().join("rrand"),
            hop: HopConfig {
                interval_ms: 10,
                min_hz: 24_000_000,
                max_hz: 1_700_000_000,
                max_failures,
            },
            ..Default::default()
        }
    }

    /// Accept one client, send the R820T handshake, read `commands` 5-byte
    /// commands, then close the connection.
    fn server_closing_after(commands: usize) -> (String, JoinHandle<Vec<u8>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let handle = thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            conn.write_all(&R820T_HANDSHAKE).unwrap();
            let mut received = vec![0u8; commands * 5];
            conn.read_exact(&mut received).unwrap();
            received
        });
        (addr, handle)
    }

    #[test]
    fn daemon_streams_whitened_bytes_to_fifo() {
        let server = MockServer::start(R820T_HANDSHAKE, Some(0));
        let dir = tempfile::tempdir().unwrap();
        let config = config_for(&server.addr, &dir);
        let shutdown = Shutdown::new();

        let daemon = Daemon::start(&config, shutdown.clone()).unwrap();
        assert_eq!(daemon.info().tuner, Tuner::R820T);

        while !config.path.exists() {
            thread::sleep(Duration::from_millis(1));
        }
        let mut fifo = File::open(&config.path).unwrap();
        let mut out = vec![0u8; 4096];
        fifo.read_exact(&mut out).unwrap();
        assert!(out.iter().any(|&b| b != 0));
        assert!(out.iter().any(|&b| b != out[0]));

        shutdown.trigger();
        let mut rest = Vec::new();
        let _ = fifo.read_to_end(&mut rest);
        daemon.wait().unwrap();
        assert!(!config.path.exists());

        let received = server.received();
        assert_eq!(
            received,
            vec![
                Command::GainByIndex.opcode(), 0, 0, 0, 3, //
                Command::CenterFreq.opcode(), 0x05, 0xF5, 0xE1, 0x00,
            ]
        );
    }

    #[test]
    fn daemon_refuses_bad_device_before_creating_fifo() {
        let server = MockServer::start(*b"RTL1\0\0\0\x05\0\0\0\x0a", None);
        let dir = tempfile::tempdir().unwrap();
        let config = config_for(&server.addr, &dir);

        let err = Daemon::start(&config, Shutdown::new()).err().unwrap();
        assert!(matches!(err, RadioError::Validation { .. }), "{err:?}");
        assert!(!config.path.exists());
        assert!(server.received().is_empty());
    }

    #[test]
    fn daemon_rejects_out_of_range_gain_index() {
        let server = MockServer::start(R820T_HANDSHAKE, None);
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_for(&server.addr, &dir);
        config.tuner.gain_by_index = Some(11);

        let err = Daemon::start(&config, Shutdown::new()).err().unwrap();
        assert!(matches!(err, RadioError::Range { .. }), "{err:?}");
        assert!(!config.path.exists());
        assert!(server.received().is_empty());
    }

    #[test]
    fn daemon_exits_with_error_when_server_goes_away() {
        let (addr, server) = server_closing_after(2);
        let dir = tempfile::tempdir().unwrap();
        let config = config_for(&addr, &dir);

        let daemon = Daemon::start(&config, Shutdown::new()).unwrap();
        assert_eq!(
            server.join().unwrap(),
            vec![
                Command::GainByIndex.opcode(), 0, 0, 0, 3, //
                Command::CenterFreq.opcode(), 0x05, 0xF5, 0xE1, 0x00,
            ]
        );

        while !config.path.exists() {
            thread::sleep(Duration::from_millis(1));
        }
        let path = config.path.clone();
        let reader = thread::spawn(move || {
            let mut got = Vec::new();
            let _ = File::open(&path).unwrap().read_to_end(&mut got);
            got
        });

        let err = daemon.wait().unwrap_err();
        assert!(err.is_source_closed(), "{err:?}");
        assert!(reader.join().unwrap().is_empty());
        assert!(!config.path.exists());
    }

    #[test]
    fn daemon_hops_synchronously_at_startup() {
        let server = MockServer::start(R820T_HANDSHAKE, None);
        let dir = tempfile::tempdir().unwrap();
        let config = hopping_config_for(&server.addr, &dir, 1);
        let shutdown = Shutdown::new();

        let daemon = Daemon::start(&config, shutdown.clone()).unwrap();
        assert!(matches!(daemon.mode(), TuningMode::Hopping(_)));
        thread::sleep(Duration::from_millis(100));
        shutdown.trigger();
        daemon.wait().unwrap();
        assert!(!config.path.exists());

        let received = server.received();
        assert!(received.len() >= 10, "{received:?}");
        assert_eq!(received.len() % 5, 0);
        for command in received.chunks(5) {
            assert_eq!(command[0], Command::CenterFreq.opcode());
            let hz = u32::from_be_bytes([command[1], command[2], command[3], command[4]]);
            assert!((24_000_000..1_700_000_000).contains(&hz), "{hz}");
        }
    }

    #[test]
    fn daemon_returns_tuning_error_when_hops_keep_failing() {
        let (addr, server) = server_closing_after(1);
        let dir = tempfile::tempdir().unwrap();
        let config = hopping_config_for(&addr, &dir, 2);

        let daemon = Daemon::start(&config, Shutdown::new()).unwrap();
        let initial = server.join().unwrap();
        assert_eq!(initial[0], Command::CenterFreq.opcode());

        let err = daemon.wait().unwrap_err();
        assert!(matches!(err, RadioError::Tuning { failures: 2, .. }), "{err:?}");
        assert!(!config.path.exists());
    }
}
