//! High-level Sia Ledger client API

use crate::error::{Error, Result};
use crate::exchange::{Exchange, ExchangeOptions, TcpExchanger};
use crate::protocol::{SiaProtocol, params};
use crate::txn::{self, TxnMode, TxnRequest};
use crate::types::{AddressInfo, Hash, PublicKey, Signature, VersionInfo, parse_address};
use log::debug;

/// How to reach the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport {
    /// The single Ledger connected over USB
    Hid,
    /// An APDU server such as Speculos, `host:port`
    Tcp(String),
}

/// Client for the Sia app on a Ledger device.
///
/// One client owns one session. Commands take `&mut self`; wrap the client
/// in a mutex to share it between threads.
pub struct SiaLedger<E = Box<dyn Exchange>> {
    protocol: SiaProtocol<E>,
}

impl SiaLedger {
    /// Open a session over the given transport
    pub fn open(transport: &Transport, options: ExchangeOptions) -> Result<Self> {
        match transport {
            #[cfg(feature = "hid")]
            Transport::Hid => Self::open_hid(options),
            #[cfg(not(feature = "hid"))]
            Transport::Hid => Err(Error::HidUnsupported),
            Transport::Tcp(addr) => Self::open_tcp(addr, options),
        }
    }

    /// Connect to the single Ledger on USB
    #[cfg(feature = "hid")]
    pub fn open_hid(options: ExchangeOptions) -> Result<Self> {
        debug!("Searching for Ledger device...");
        let (model, stream) = crate::device::open_unique()?;
        debug!("Connected to Ledger {model}");
        let exchanger = crate::exchange::HidExchanger::new(stream, options);
        Ok(Self::new(Box::new(exchanger)))
    }

    /// Connect to an APDU server over TCP
    pub fn open_tcp(addr: &str, options: ExchangeOptions) -> Result<Self> {
        debug!("Connecting to APDU server at {addr}");
        let exchanger = TcpExchanger::connect(addr, options)?;
        Ok(Self::new(Box::new(exchanger)))
    }
}

impl<E: Exchange> SiaLedger<E> {
    pub fn new(exchanger: E) -> Self {
        Self {
            protocol: SiaProtocol::new(exchanger),
        }
    }

    pub fn exchanger(&self) -> &E {
        self.protocol.exchanger()
    }

    /// Version of the Sia app running on the device
    pub fn get_version(&mut self) -> Result<VersionInfo> {
        debug!("Getting version");
        let resp = self.protocol.get_version()?;
        match resp[..] {
            [major, minor, patch] => Ok(VersionInfo {
                major,
                minor,
                patch,
            }),
            _ => Err(Error::UnexpectedLength {
                what: "version",
                expected: 3,
                actual: resp.len(),
            }),
        }
    }

    /// Public key at `index`. The device shows it and asks the user to
    /// confirm.
    pub fn get_public_key(&mut self, index: u32) -> Result<PublicKey> {
        debug!("Getting public key {index}");
        let resp = self
            .protocol
            .get_public_key(index, params::P2_DISPLAY_PUBKEY)?;
        PublicKey::from_slice(&resp)
    }

    /// Address for the key at `index`, displayed on the device for
    /// confirmation.
    pub fn get_address(&mut self, index: u32) -> Result<AddressInfo> {
        debug!("Getting address {index}");
        let resp = self
            .protocol
            .get_public_key(index, params::P2_DISPLAY_ADDRESS)?;
        if resp.len() < PublicKey::LEN {
            return Err(Error::UnexpectedLength {
                what: "address response",
                expected: PublicKey::LEN + crate::types::ADDRESS_LEN,
                actual: resp.len(),
            });
        }
        let (key, address) = resp.split_at(PublicKey::LEN);
        Ok(AddressInfo {
            pubkey: PublicKey::from_slice(key)?,
            address: parse_address(address)?,
        })
    }

    /// Sign an arbitrary 256-bit hash.
    ///
    /// The device cannot tell where the hash came from. Only pass hashes you
    /// computed yourself from data you trust.
    pub fn sign_hash(&mut self, hash: &Hash, key_index: u32) -> Result<Signature> {
        debug!("Signing hash with key {key_index}");
        let resp = self.protocol.sign_hash(key_index, hash.as_bytes())?;
        Signature::from_slice(&resp)
    }

    /// Have the device compute (and display) the signature hash of `txn`.
    pub fn calc_txn_hash(&mut self, txn: &[u8], sig_index: u16, change_index: u32) -> Result<Hash> {
        let request = TxnRequest {
            sig_index,
            change_index,
            txn,
        };
        let resp = txn::upload(&mut self.protocol, TxnMode::Hash, &request)?;
        Hash::from_slice(&resp)
    }

    /// Sign the signature hash of `txn` with the key at `key_index`.
    pub fn sign_txn(
        &mut self,
        txn: &[u8],
        sig_index: u16,
        key_index: u32,
        change_index: u32,
    ) -> Result<Signature> {
        let request = TxnRequest {
            sig_index,
            change_index,
            txn,
        };
        let resp = txn::upload(&mut self.protocol, TxnMode::Sign { key_index }, &request)?;
        Signature::from_slice(&resp)
    }
}
