//! Streaming a serialized transaction to the device
//!
//! The upload is `key index (LE u32) ‖ sig index (LE u16) ‖ change index
//! (LE u32) ‖ transaction`, cut into 255-byte chunks. Only the response to
//! the last chunk carries the result. If an upload stops partway the device
//! keeps the partial transaction and answers the next first chunk with
//! `StatusWord::IMPROPER_INIT`, clearing its state as it does so.

use crate::apdu::MAX_PAYLOAD;
use crate::error::{Error, Result};
use crate::exchange::Exchange;
use crate::protocol::{SiaProtocol, commands, params};
use log::debug;

/// What the device should do with the uploaded transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnMode {
    /// Compute and display the signature hash
    Hash,
    /// Sign the signature hash with the given key
    Sign { key_index: u32 },
}

impl TxnMode {
    pub fn p2(&self) -> u8 {
        match self {
            TxnMode::Hash => params::P2_DISPLAY_HASH,
            TxnMode::Sign { .. } => params::P2_SIGN_HASH,
        }
    }

    fn key_index(&self) -> u32 {
        match self {
            TxnMode::Hash => 0,
            TxnMode::Sign { key_index } => *key_index,
        }
    }

    fn expected_len(&self) -> (usize, &'static str) {
        match self {
            TxnMode::Hash => (32, "hash"),
            TxnMode::Sign { .. } => (64, "signature"),
        }
    }
}

/// A transaction and the indices the device needs to process it
#[derive(Debug, Clone, Copy)]
pub struct TxnRequest<'a> {
    /// Index of the TransactionSignature being computed
    pub sig_index: u16,
    /// Key index of the change output, `u32::MAX` when there is none
    pub change_index: u32,
    /// Sia binary encoding of the transaction
    pub txn: &'a [u8],
}

/// Assemble the byte stream that gets chunked.
pub fn encode_upload(mode: TxnMode, request: &TxnRequest<'_>) -> Vec<u8> {
    let mut buf = Vec::with_capacity(10 + request.txn.len());
    buf.extend_from_slice(&mode.key_index().to_le_bytes());
    buf.extend_from_slice(&request.sig_index.to_le_bytes());
    buf.extend_from_slice(&request.change_index.to_le_bytes());
    buf.extend_from_slice(request.txn);
    buf
}

/// Cut `buf` into `(p1, chunk)` pairs. Always yields at least one chunk.
pub fn chunk_plan(buf: &[u8]) -> Vec<(u8, &[u8])> {
    if buf.is_empty() {
        return vec![(params::P1_FIRST, buf)];
    }
    buf.chunks(MAX_PAYLOAD)
        .enumerate()
        .map(|(i, chunk)| {
            let p1 = if i == 0 {
                params::P1_FIRST
            } else {
                params::P1_MORE
            };
            (p1, chunk)
        })
        .collect()
}

/// Upload the transaction and return the final response, checked against
/// the length `mode` calls for. The first failing chunk aborts the upload.
pub fn upload<E: Exchange>(
    protocol: &mut SiaProtocol<E>,
    mode: TxnMode,
    request: &TxnRequest<'_>,
) -> Result<Vec<u8>> {
    let buf = encode_upload(mode, request);
    let plan = chunk_plan(&buf);
    debug!(
        "Uploading {} transaction bytes in {} chunk(s)",
        request.txn.len(),
        plan.len()
    );

    let mut resp = Vec::new();
    for (p1, chunk) in plan {
        resp = protocol.call(commands::CALC_TXN_HASH, p1, mode.p2(), chunk)?;
    }

    let (expected, what) = mode.expected_len();
    if resp.len() != expected {
        return Err(Error::UnexpectedLength {
            what,
            expected,
            actual: resp.len(),
        });
    }
    Ok(resp)
}
