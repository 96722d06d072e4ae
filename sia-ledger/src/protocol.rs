//! Sia app command set

use crate::apdu::{Apdu, split_response};
use crate::error::Result;
use crate::exchange::Exchange;
use log::debug;

/// Class byte of every Sia app command
pub const CLA: u8 = 0xE0;

/// Instructions supported by the Sia app
pub mod commands {
    pub const GET_VERSION: u8 = 0x01;
    pub const GET_PUBLIC_KEY: u8 = 0x02;
    pub const SIGN_HASH: u8 = 0x04;
    pub const CALC_TXN_HASH: u8 = 0x08;
}

/// P1/P2 values
pub mod params {
    /// First chunk of a multi-chunk transfer
    pub const P1_FIRST: u8 = 0x00;
    /// Any later chunk
    pub const P1_MORE: u8 = 0x80;

    pub const P2_DISPLAY_ADDRESS: u8 = 0x00;
    pub const P2_DISPLAY_PUBKEY: u8 = 0x01;
    pub const P2_DISPLAY_HASH: u8 = 0x00;
    pub const P2_SIGN_HASH: u8 = 0x01;
}

/// Low-level command handler on top of an [`Exchange`]
pub struct SiaProtocol<E> {
    exchanger: E,
}

impl<E: Exchange> SiaProtocol<E> {
    pub fn new(exchanger: E) -> Self {
        Self { exchanger }
    }

    pub fn exchanger(&self) -> &E {
        &self.exchanger
    }

    /// Send one command and check the status word. Returns the response
    /// payload with the status word stripped.
    pub fn call(&mut self, ins: u8, p1: u8, p2: u8, data: &[u8]) -> Result<Vec<u8>> {
        debug!(
            "Sending command 0x{ins:02x} (p1=0x{p1:02x}, p2=0x{p2:02x}, {} bytes)",
            data.len()
        );
        let resp = self
            .exchanger
            .exchange(&Apdu::new(CLA, ins, p1, p2, data))?;
        let (payload, status) = split_response(resp)?;
        status.check()?;
        Ok(payload)
    }

    pub fn get_version(&mut self) -> Result<Vec<u8>> {
        self.call(commands::GET_VERSION, 0, 0, &[])
    }

    /// The device displays the key (or address) and waits for the user to
    /// confirm it.
    pub fn get_public_key(&mut self, key_index: u32, p2: u8) -> Result<Vec<u8>> {
        self.call(
            commands::GET_PUBLIC_KEY,
            0,
            p2,
            &key_index.to_le_bytes(),
        )
    }

    pub fn sign_hash(&mut self, key_index: u32, hash: &[u8; 32]) -> Result<Vec<u8>> {
        let mut data = Vec::with_capacity(4 + hash.len());
        data.extend_from_slice(&key_index.to_le_bytes());
        data.extend_from_slice(hash);
        self.call(commands::SIGN_HASH, 0, 0, &data)
    }
}
