//! APDU command envelope and status words
//!
//! ```text
//! | CLA | INS | P1 | P2 | Lc | Data     |
//! | 1B  | 1B  | 1B | 1B | 1B | Lc bytes |
//! ```
//!
//! Responses are `data ‖ SW1 SW2`, with the status word big-endian.

use crate::error::{Error, Result};
use std::fmt;

/// Largest payload that fits the one-byte Lc field.
pub const MAX_PAYLOAD: usize = 255;

/// An APDU command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Apdu {
    pub cla: u8,
    pub ins: u8,
    pub p1: u8,
    pub p2: u8,
    payload: Vec<u8>,
}

impl Apdu {
    /// Build an APDU.
    ///
    /// # Panics
    ///
    /// Panics if `payload` is longer than [`MAX_PAYLOAD`]. Callers that stream
    /// larger data must chunk it first.
    pub fn new(cla: u8, ins: u8, p1: u8, p2: u8, payload: impl Into<Vec<u8>>) -> Self {
        let payload = payload.into();
        assert!(
            payload.len() <= MAX_PAYLOAD,
            "APDU payload cannot exceed {MAX_PAYLOAD} bytes (got {})",
            payload.len()
        );
        Self {
            cla,
            ins,
            p1,
            p2,
            payload,
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Serialize to `{CLA, INS, P1, P2, Lc, payload}`.
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(5 + self.payload.len());
        bytes.extend_from_slice(&[
            self.cla,
            self.ins,
            self.p1,
            self.p2,
            self.payload.len() as u8,
        ]);
        bytes.extend_from_slice(&self.payload);
        bytes
    }
}

/// Two-byte trailer of every device response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusWord(pub u16);

impl StatusWord {
    pub const OK: StatusWord = StatusWord(0x9000);
    pub const USER_REJECTED: StatusWord = StatusWord(0x6985);
    pub const DEVELOPER_ERR: StatusWord = StatusWord(0x6B00);
    pub const INVALID_PARAM: StatusWord = StatusWord(0x6B01);
    pub const IMPROPER_INIT: StatusWord = StatusWord(0x6B02);
    pub const INS_NOT_SUPPORTED: StatusWord = StatusWord(0x6D00);
    pub const CLA_NOT_SUPPORTED: StatusWord = StatusWord(0x6E00);

    fn description(&self) -> Option<&'static str> {
        match *self {
            Self::OK => Some("success"),
            Self::USER_REJECTED => Some("user rejected"),
            Self::DEVELOPER_ERR => Some("developer error"),
            Self::INVALID_PARAM => Some("invalid parameter"),
            Self::IMPROPER_INIT => Some("improper initialization"),
            Self::INS_NOT_SUPPORTED => Some("instruction not supported"),
            Self::CLA_NOT_SUPPORTED => Some("class not supported"),
            _ => None,
        }
    }

    /// Map the status word onto the caller-facing outcome.
    pub fn check(self) -> Result<()> {
        match self {
            Self::OK => Ok(()),
            Self::USER_REJECTED => Err(Error::UserRejected),
            Self::INVALID_PARAM => Err(Error::InvalidParameters),
            other => Err(Error::DeviceError(other)),
        }
    }
}

impl fmt::Display for StatusWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.description() {
            Some(desc) => write!(f, "Error code 0x{:04x} ({desc})", self.0),
            None => write!(f, "Error code 0x{:04x}", self.0),
        }
    }
}

/// Split a raw response into its payload and trailing status word.
pub fn split_response(mut resp: Vec<u8>) -> Result<(Vec<u8>, StatusWord)> {
    if resp.len() < 2 {
        return Err(Error::MissingStatusCode);
    }
    let at = resp.len() - 2;
    let code = StatusWord(u16::from_be_bytes([resp[at], resp[at + 1]]));
    resp.truncate(at);
    Ok((resp, code))
}
