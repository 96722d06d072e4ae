//! Error types for sia-ledger

use crate::apdu::StatusWord;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "hid")]
    #[error("HID error: {0}")]
    Hid(#[from] hidapi::HidError),

    #[error("Message of {0} bytes is too long to frame")]
    MessageTooLong(usize),

    #[error("Read {0} bytes from HID, expected a full 64-byte packet")]
    ShortPacket(usize),

    #[error("Bad channel ID 0x{0:04x}")]
    BadChannelId(u16),

    #[error("Bad command tag 0x{0:02x}")]
    BadCommandTag(u8),

    #[error("Bad sequence number {actual} (expected {expected})")]
    BadSequence { expected: u16, actual: u16 },

    #[error("APDU response missing status code")]
    MissingStatusCode,

    #[error("User denied request")]
    UserRejected,

    #[error("Invalid request parameters")]
    InvalidParameters,

    #[error("Device error: {0}")]
    DeviceError(StatusWord),

    #[error("{what} has wrong length: expected {expected} bytes, got {actual}")]
    UnexpectedLength {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid address returned by device: {0}")]
    InvalidAddress(String),

    #[error("USB HID support is not compiled in (enable the `hid` feature)")]
    HidUnsupported,

    #[error("No Ledger device found")]
    DeviceNotFound,

    #[error("Found {0} Ledger devices, expected exactly one. Is the Sia app running?")]
    MultipleDevices(usize),
}

impl Error {
    /// True for errors that mean the HID stream is out of sync with the
    /// device. The only recovery is to drop the session and reopen.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Error::ShortPacket(_)
                | Error::BadChannelId(_)
                | Error::BadCommandTag(_)
                | Error::BadSequence { .. }
        )
    }

    /// True for status words the device sent back in an otherwise valid
    /// response.
    pub fn is_device_status(&self) -> bool {
        matches!(
            self,
            Error::UserRejected | Error::InvalidParameters | Error::DeviceError(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
