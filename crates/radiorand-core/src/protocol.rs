//! rtl_tcp wire format.
//!
//! Everything on the wire is big-endian. On connect the server sends one
//! 12-byte [`DongleInfo`] record; after that the client writes 5-byte
//! [`CommandMessage`]s and the server streams raw I/Q samples back.

use std::fmt;

/// Magic bytes that open every rtl_tcp handshake.
pub const DONGLE_MAGIC: [u8; 4] = *b"RTL0";

/// Size of the handshake record in bytes.
pub const DONGLE_INFO_LEN: usize = 12;

/// Size of an encoded command in bytes.
pub const COMMAND_LEN: usize = 5;

/// Tuner chip reported by the dongle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tuner {
    E4000,
    FC0012,
    FC0013,
    FC2580,
    R820T,
    R828D,
    /// Any code the server reports that we have no name for.
    Unknown(u32),
}

impl From<u32> for Tuner {
    fn from(code: u32) -> Self {
        match code {
            1 => Self::E4000,
            2 => Self::FC0012,
            3 => Self::FC0013,
            4 => Self::FC2580,
            5 => Self::R820T,
            6 => Self::R828D,
            other => Self::Unknown(other),
        }
    }
}

impl fmt::Display for Tuner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::E4000 => write!(f, "E4000"),
            Self::FC0012 => write!(f, "FC0012"),
            Self::FC0013 => write!(f, "FC0013"),
            Self::FC2580 => write!(f, "FC2580"),
            Self::R820T => write!(f, "R820T"),
            Self::R828D => write!(f, "R828D"),
            Self::Unknown(_) => write!(f, "UNKNOWN"),
        }
    }
}

/// Identity record the server sends right after the TCP connection opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DongleInfo {
    pub magic: [u8; 4],
    pub tuner: Tuner,
    /// Number of discrete gain steps; the upper bound for gain-by-index.
    pub gain_count: u32,
}

impl DongleInfo {
    /// Decode the 12-byte handshake record. Does not check the magic.
    pub fn from_bytes(buf: &[u8; DONGLE_INFO_LEN]) -> Self {
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&buf[0..4]);
        let tuner = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
        let gain_count = u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]);
        Self {
            magic,
            tuner: Tuner::from(tuner),
            gain_count,
        }
    }

    /// True if the magic matches `RTL0`.
    pub fn is_valid(&self) -> bool {
        self.magic == DONGLE_MAGIC
    }
}

impl fmt::Display for DongleInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{Magic:{:?} Tuner:{} GainCount:{}}}",
            String::from_utf8_lossy(&self.magic),
            self.tuner,
            self.gain_count
        )
    }
}

/// Command opcodes understood by rtl_tcp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    CenterFreq = 1,
    SampleRate = 2,
    TunerGainMode = 3,
    TunerGain = 4,
    FreqCorrection = 5,
    TunerIfGain = 6,
    TestMode = 7,
    AgcMode = 8,
    DirectSampling = 9,
    OffsetTuning = 10,
    RtlXtalFreq = 11,
    TunerXtalFreq = 12,
    GainByIndex = 13,
}

impl Command {
    pub fn opcode(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CenterFreq => write!(f, "center_freq"),
            Self::SampleRate => write!(f, "sample_rate"),
            Self::TunerGainMode => write!(f, "tuner_gain_mode"),
            Self::TunerGain => write!(f, "tuner_gain"),
            Self::FreqCorrection => write!(f, "freq_correction"),
            Self::TunerIfGain => write!(f, "tuner_if_gain"),
            Self::TestMode => write!(f, "test_mode"),
            Self::AgcMode => write!(f, "agc_mode"),
            Self::DirectSampling => write!(f, "direct_sampling"),
            Self::OffsetTuning => write!(f, "offset_tuning"),
            Self::RtlXtalFreq => write!(f, "rtl_xtal_freq"),
            Self::TunerXtalFreq => write!(f, "tuner_xtal_freq"),
            Self::GainByIndex => write!(f, "gain_by_index"),
        }
    }
}

/// One opcode plus its 32-bit parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandMessage {
    pub command: Command,
    pub param: u32,
}

impl CommandMessage {
    pub fn new(command: Command, param: u32) -> Self {
        Self { command, param }
    }

    /// Wire encoding: opcode byte followed by the big-endian parameter.
    pub fn encode(&self) -> [u8; COMMAND_LEN] {
        let p = self.param.to_be_bytes();
        [self.command.opcode(), p[0], p[1], p[2], p[3]]
    }
}
