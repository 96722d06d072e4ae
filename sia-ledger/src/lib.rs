//! Rust client for the Sia wallet app on Ledger hardware wallets
//!
//! This crate talks to a Ledger Nano S, Nano X or Stax running the Sia app,
//! either over USB HID or over TCP (for the Speculos emulator). It handles
//! the HID packet framing, the APDU envelope and the app's status words, and
//! streams transactions in chunks. Keys never leave the device.
//!
//! # Examples
//!
//! ```no_run
//! use sia_ledger::{ExchangeOptions, Hash, SiaLedger, Transport};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut ledger = SiaLedger::open(&Transport::Hid, ExchangeOptions::default())?;
//!
//! println!("Sia app {}", ledger.get_version()?);
//!
//! // The device asks the user to confirm the address
//! let info = ledger.get_address(0)?;
//! println!("Address: {}", info.address);
//!
//! let signature = ledger.sign_hash(&Hash([0u8; 32]), 0)?;
//! println!("Signature: {signature}");
//! # Ok(())
//! # }
//! ```

pub mod apdu;
mod client;
#[cfg(feature = "hid")]
pub mod device;
mod error;
pub mod exchange;
pub mod hid;
pub mod protocol;
pub mod txn;
mod types;

pub use apdu::{Apdu, StatusWord};
pub use client::{SiaLedger, Transport};
pub use error::{Error, Result};
pub use exchange::{Exchange, ExchangeOptions, HidExchanger, TcpExchanger};
pub use txn::{TxnMode, TxnRequest};
pub use types::{
    ADDRESS_LEN, AddressInfo, DeviceModel, Hash, LEDGER_VENDOR_ID, PublicKey, Signature,
    VersionInfo,
};
