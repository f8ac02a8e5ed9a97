//! rtl_tcp protocol client.
//!
//! One TCP connection carries both directions of the protocol: commands go
//! client → server, samples come server → client. [`SdrClient`] owns the
//! command direction behind a mutex; [`SdrClient::sample_stream`] hands out a
//! duplicated handle that is only ever read from. The two directions of a
//! TCP socket are independent, so a tuning command can never land in the
//! middle of a sample read.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crate::error::{RadioError, Result};
use crate::protocol::{
    Command, CommandMessage, DONGLE_INFO_LEN, DONGLE_MAGIC, DongleInfo,
};

/// A validated session with one rtl_tcp server.
#[derive(Debug)]
pub struct SdrClient {
    control: Mutex<TcpStream>,
    info: DongleInfo,
    peer: SocketAddr,
}

impl SdrClient {
    /// Connect to `addr` (e.g. `"127.0.0.1:1234"`) and perform the handshake.
    pub fn connect(addr: &str) -> Result<Self> {
        Self::connect_with_timeout(addr, None)
    }

    /// Like [`SdrClient::connect`], bounding each TCP connect attempt.
    pub fn connect_with_timeout(addr: &str, timeout: Option<Duration>) -> Result<Self> {
        let stream = open_stream(addr, timeout)?;
        Self::handshake(stream)
    }

    /// Read and validate the dongle record on an already-open stream.
    ///
    /// The stream is shut down before any error is returned.
    pub fn handshake(mut stream: TcpStream) -> Result<Self> {
        let peer = match stream.peer_addr() {
            Ok(peer) => peer,
            Err(e) => {
                let _ = stream.shutdown(Shutdown::Both);
                return Err(RadioError::Connection(e));
            }
        };

        let mut record = [0u8; DONGLE_INFO_LEN];
        if let Err(e) = stream.read_exact(&mut record) {
            let _ = stream.shutdown(Shutdown::Both);
            return Err(RadioError::Protocol(e.to_string()));
        }

        let info = DongleInfo::from_bytes(&record);
        if !info.is_valid() {
            let _ = stream.shutdown(Shutdown::Both);
            return Err(RadioError::Validation {
                expected: String::from_utf8_lossy(&DONGLE_MAGIC).into_owned(),
                received: String::from_utf8_lossy(&info.magic).into_owned(),
            });
        }

        log::debug!("handshake with {peer} complete: {info}");
        Ok(Self {
            control: Mutex::new(stream),
            info,
            peer,
        })
    }

    /// Identity the dongle reported during the handshake.
    pub fn info(&self) -> &DongleInfo {
        &self.info
    }

    /// Address of the rtl_tcp server.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Write one command. No reply is expected.
    pub fn execute(&self, command: Command, param: u32) -> Result<()> {
        let msg = CommandMessage::new(command, param);
        let mut control = self.control.lock().unwrap_or_else(PoisonError::into_inner);
        control.write_all(&msg.encode())?;
        log::trace!("sent {command}={param}");
        Ok(())
    }

    /// Read-only handle onto the sample direction of the connection.
    pub fn sample_stream(&self) -> Result<SampleStream> {
        let control = self.control.lock().unwrap_or_else(PoisonError::into_inner);
        let stream = control.try_clone()?;
        Ok(SampleStream { stream })
    }

    /// Shut down both directions. Outstanding sample streams see EOF.
    pub fn close(&self) -> Result<()> {
        let control = self.control.lock().unwrap_or_else(PoisonError::into_inner);
        match control.shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    // -----------------------------------------------------------------------
    // Typed setters
    // -----------------------------------------------------------------------

    /// Center frequency in Hz.
    pub fn set_center_freq(&self, hz: u32) -> Result<()> {
        self.execute(Command::CenterFreq, hz)
    }

    /// Sample rate in Hz.
    pub fn set_sample_rate(&self, hz: u32) -> Result<()> {
        self.execute(Command::SampleRate, hz)
    }

    /// Tuner gain in tenths of a dB (197 => 19.7 dB).
    pub fn set_gain(&self, tenth_db: u32) -> Result<()> {
        self.execute(Command::TunerGain, tenth_db)
    }

    /// Tuner AGC; `true` selects automatic gain.
    pub fn set_gain_mode(&self, automatic: bool) -> Result<()> {
        // rtl_tcp treats 0 as automatic and 1 as manual.
        self.execute(Command::TunerGainMode, if automatic { 0 } else { 1 })
    }

    /// Select a gain step by position; must be `<= gain_count`.
    pub fn set_gain_by_index(&self, index: u32) -> Result<()> {
        if index > self.info.gain_count {
            return Err(RadioError::Range {
                what: "gain index",
                value: index,
                max: self.info.gain_count,
            });
        }
        self.execute(Command::GainByIndex, index)
    }

    /// Frequency correction in ppm.
    pub fn set_freq_correction(&self, ppm: i32) -> Result<()> {
        self.execute(Command::FreqCorrection, ppm as u32)
    }

    /// Gain of one intermediate-frequency stage.
    pub fn set_tuner_if_gain(&self, stage: u16, gain: u16) -> Result<()> {
        self.execute(Command::TunerIfGain, (u32::from(stage) << 16) | u32::from(gain))
    }

    pub fn set_test_mode(&self, enabled: bool) -> Result<()> {
        self.execute(Command::TestMode, u32::from(enabled))
    }

    /// RTL2832 digital AGC.
    pub fn set_agc_mode(&self, enabled: bool) -> Result<()> {
        self.execute(Command::AgcMode, u32::from(enabled))
    }

    pub fn set_direct_sampling(&self, enabled: bool) -> Result<()> {
        self.execute(Command::DirectSampling, u32::from(enabled))
    }

    pub fn set_offset_tuning(&self, enabled: bool) -> Result<()> {
        self.execute(Command::OffsetTuning, u32::from(enabled))
    }

    /// RTL2832 crystal frequency in Hz.
    pub fn set_rtl_xtal_freq(&self, hz: u32) -> Result<()> {
        self.execute(Command::RtlXtalFreq, hz)
    }

    /// Tuner crystal frequency in Hz.
    pub fn set_tuner_xtal_freq(&self, hz: u32) -> Result<()> {
        self.execute(Command::TunerXtalFreq, hz)
    }
}

/// Raw sample bytes from the server, unprocessed.
#[derive(Debug)]
pub struct SampleStream {
    stream: TcpStream,
}

impl Read for SampleStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }
}

fn open_stream(addr: &str, timeout: Option<Duration>) -> Result<TcpStream> {
    let Some(timeout) = timeout else {
        return TcpStream::connect(addr).map_err(RadioError::Connection);
    };

    let mut last_err = io::Error::new(io::ErrorKind::InvalidInput, "address resolved to nothing");
    for sock in addr.to_socket_addrs().map_err(RadioError::Connection)? {
        match TcpStream::connect_timeout(&sock, timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => last_err = e,
        }
    }
    Err(RadioError::Connection(last_err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    fn serve_once(record: [u8; DONGLE_INFO_LEN]) -> (String, thread::JoinHandle<Vec<u8>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let handle = thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            conn.write_all(&record).unwrap();
            let mut received = Vec::new();
            let _ = conn.read_to_end(&mut received);
            received
        });
        (addr, handle)
    }

    const R820T_RECORD: [u8; DONGLE_INFO_LEN] = [b'R', b'T', b'L', b'0', 0, 0, 0, 5, 0, 0, 0, 10];

    #[test]
    fn test_setters_encode_expected_bytes() {
        let (addr, server) = serve_once(R820T_RECORD);
        let client = SdrClient::connect(&addr).unwrap();
        client.set_gain_mode(true).unwrap();
        client.set_freq_correction(-1).unwrap();
        client.set_tuner_if_gain(2, 30).unwrap();
        client.set_agc_mode(true).unwrap();
        client.close().unwrap();
        drop(client);

        let received = server.join().unwrap();
        assert_eq!(
            received,
            vec![
                3, 0, 0, 0, 0, //
                5, 0xFF, 0xFF, 0xFF, 0xFF, //
                6, 0, 2, 0, 30, //
                8, 0, 0, 0, 1,
            ]
        );
    }

    #[test]
    fn test_gain_by_index_at_bound_is_accepted() {
        let (addr, server) = serve_once(R820T_RECORD);
        let client = SdrClient::connect(&addr).unwrap();
        client.set_gain_by_index(10).unwrap();
        drop(client);
        assert_eq!(server.join().unwrap(), vec![13, 0, 0, 0, 10]);
    }

    #[test]
    fn test_connect_refused_is_connection_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);
        let err = SdrClient::connect(&addr).unwrap_err();
        assert!(matches!(err, RadioError::Connection(_)), "{err:?}");
    }

    #[test]
    fn test_short_handshake_is_protocol_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let server = thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            conn.write_all(b"RTL0\0\0").unwrap();
        });
        let err = SdrClient::connect(&addr).unwrap_err();
        server.join().unwrap();
        assert!(matches!(err, RadioError::Protocol(_)), "{err:?}");
    }

    #[test]
    fn test_sample_stream_reads_after_handshake() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let server = thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            conn.write_all(&R820T_RECORD).unwrap();
            conn.write_all(&[7u8; 32]).unwrap();
        });
        let client = SdrClient::connect(&addr).unwrap();
        let mut samples = client.sample_stream().unwrap();
        let mut buf = [0u8; 32];
        samples.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [7u8; 32]);
        server.join().unwrap();
    }
}
