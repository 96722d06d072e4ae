//! Common types used throughout sia-ledger

use crate::error::{Error, Result};
use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Ledger's USB vendor ID
pub const LEDGER_VENDOR_ID: u16 = 0x2c97;

/// Length of the hex address text the device appends to the public key
pub const ADDRESS_LEN: usize = 76;

const UNLOCK_HASH_LEN: usize = 32;
const CHECKSUM_LEN: usize = 6;

/// Ledger models the Sia app runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceModel {
    NanoS,
    NanoX,
    Stax,
}

impl DeviceModel {
    pub const ALL: [DeviceModel; 3] = [DeviceModel::NanoS, DeviceModel::NanoX, DeviceModel::Stax];

    pub fn product_id(&self) -> u16 {
        match self {
            DeviceModel::NanoS => 0x0001,
            DeviceModel::NanoX => 0x0004,
            DeviceModel::Stax => 0x0006,
        }
    }

    pub fn from_product_id(product_id: u16) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|model| model.product_id() == product_id)
    }
}

impl fmt::Display for DeviceModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceModel::NanoS => "Nano S",
            DeviceModel::NanoX => "Nano X",
            DeviceModel::Stax => "Stax",
        };
        f.write_str(name)
    }
}

/// Sia app version reported by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}

impl fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}.{}.{}", self.major, self.minor, self.patch)
    }
}

macro_rules! fixed_bytes {
    ($(#[$meta:meta])* $name:ident, $len:expr, $what:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(pub [u8; $len]);

        impl $name {
            pub const LEN: usize = $len;

            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            /// Exact-length conversion from a device response.
            pub fn from_slice(bytes: &[u8]) -> Result<Self> {
                <[u8; $len]>::try_from(bytes)
                    .map(Self)
                    .map_err(|_| Error::UnexpectedLength {
                        what: $what,
                        expected: $len,
                        actual: bytes.len(),
                    })
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), hex::encode(self.0))
            }
        }

        impl Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                serializer.serialize_str(&hex::encode(self.0))
            }
        }
    };
}

fixed_bytes!(
    /// Ed25519 public key held by the device
    PublicKey,
    32,
    "pubkey"
);
fixed_bytes!(
    /// 256-bit hash (signature hash of a transaction)
    Hash,
    32,
    "hash"
);
fixed_bytes!(
    /// Ed25519 signature
    Signature,
    64,
    "signature"
);

impl fmt::Display for PublicKey {
    /// Sia's textual form, `ed25519:<hex>`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ed25519:{}", hex::encode(self.0))
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Public key plus the address the device derived and displayed for it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressInfo {
    pub pubkey: PublicKey,
    pub address: String,
}

/// Check the address text that follows the public key in a GetPublicKey
/// response: 32-byte unlock hash plus 6-byte checksum, hex encoded. The
/// checksum is the first 6 bytes of the BLAKE2b-256 of the unlock hash.
pub fn parse_address(bytes: &[u8]) -> Result<String> {
    let invalid = || Error::InvalidAddress(String::from_utf8_lossy(bytes).into_owned());

    let text = std::str::from_utf8(bytes).map_err(|_| invalid())?;
    if text.len() != ADDRESS_LEN {
        return Err(invalid());
    }
    let raw = hex::decode(text).map_err(|_| invalid())?;
    let (unlock_hash, checksum) = raw.split_at(UNLOCK_HASH_LEN);

    let digest = Blake2b::<U32>::digest(unlock_hash);
    if digest[..CHECKSUM_LEN] != *checksum {
        return Err(invalid());
    }
    Ok(text.to_ascii_lowercase())
}
