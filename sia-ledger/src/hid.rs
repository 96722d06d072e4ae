//! Ledger HID packet framing
//!
//! Every USB report is 64 bytes:
//!
//! ```text
//! | channel (BE) | tag  | sequence (BE) | fragment |
//! | 0x0101       | 0x05 | 0, 1, 2, ...  | 59 bytes |
//! ```
//!
//! The fragments concatenate into one logical stream that starts with the
//! big-endian length of the message.

use crate::error::{Error, Result};
use log::debug;
use std::io::{Read, Write};

pub const PACKET_SIZE: usize = 64;
pub const CHANNEL_ID: u16 = 0x0101;
pub const COMMAND_TAG: u8 = 0x05;
const HEADER_SIZE: usize = 5;
pub const FRAGMENT_SIZE: usize = PACKET_SIZE - HEADER_SIZE;

/// Build one report. `fragment` must be at most [`FRAGMENT_SIZE`] bytes; the
/// tail is zero-padded.
pub fn encode_packet(seq: u16, fragment: &[u8]) -> [u8; PACKET_SIZE] {
    let mut packet = [0u8; PACKET_SIZE];
    packet[..2].copy_from_slice(&CHANNEL_ID.to_be_bytes());
    packet[2] = COMMAND_TAG;
    packet[3..5].copy_from_slice(&seq.to_be_bytes());
    packet[HEADER_SIZE..HEADER_SIZE + fragment.len()].copy_from_slice(fragment);
    packet
}

/// Number of reports needed to carry a message of `len` bytes.
pub fn packet_count(len: usize) -> usize {
    (len + 2).div_ceil(FRAGMENT_SIZE)
}

/// Splits messages into HID reports on write and reassembles them on read.
pub struct HidFramer<T> {
    inner: T,
    seq: u16,
    packet: [u8; PACKET_SIZE],
    pos: usize,
}

impl<T: Read + Write> HidFramer<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            seq: 0,
            packet: [0u8; PACKET_SIZE],
            pos: PACKET_SIZE,
        }
    }

    /// Start a new exchange: the next packet read must carry sequence 0.
    pub fn reset(&mut self) {
        self.seq = 0;
        self.pos = PACKET_SIZE;
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Write `msg` as a length-prefixed run of reports.
    pub fn write_message(&mut self, msg: &[u8]) -> Result<()> {
        let len = u16::try_from(msg.len()).map_err(|_| Error::MessageTooLong(msg.len()))?;

        let mut stream = Vec::with_capacity(msg.len() + 2);
        stream.extend_from_slice(&len.to_be_bytes());
        stream.extend_from_slice(msg);

        for (seq, fragment) in stream.chunks(FRAGMENT_SIZE).enumerate() {
            let packet = encode_packet(seq as u16, fragment);
            self.inner.write_all(&packet)?;
        }
        self.inner.flush()?;
        Ok(())
    }

    /// Copy buffered stream bytes into `buf`, pulling the next report only
    /// when the current one has been drained.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.pos == PACKET_SIZE {
            self.next_packet()?;
        }
        let n = buf.len().min(PACKET_SIZE - self.pos);
        buf[..n].copy_from_slice(&self.packet[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }

    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            filled += self.read(&mut buf[filled..])?;
        }
        Ok(())
    }

    fn next_packet(&mut self) -> Result<()> {
        let n = self.inner.read(&mut self.packet)?;
        if n != PACKET_SIZE {
            debug!("Short HID read: {n} bytes");
            return Err(Error::ShortPacket(n));
        }

        let channel = u16::from_be_bytes([self.packet[0], self.packet[1]]);
        let tag = self.packet[2];
        let seq = u16::from_be_bytes([self.packet[3], self.packet[4]]);
        if channel != CHANNEL_ID {
            return Err(Error::BadChannelId(channel));
        }
        if tag != COMMAND_TAG {
            return Err(Error::BadCommandTag(tag));
        }
        if seq != self.seq {
            return Err(Error::BadSequence {
                expected: self.seq,
                actual: seq,
            });
        }

        self.seq = self.seq.wrapping_add(1);
        self.pos = HEADER_SIZE;
        Ok(())
    }
}

/// Byte stream over a `hidapi` device, one 64-byte report per call.
#[cfg(feature = "hid")]
pub struct HidStream {
    device: hidapi::HidDevice,
}

#[cfg(feature = "hid")]
impl HidStream {
    pub fn new(device: hidapi::HidDevice) -> Self {
        Self { device }
    }
}

#[cfg(feature = "hid")]
impl Read for HidStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.device.read(buf).map_err(std::io::Error::other)
    }
}

#[cfg(feature = "hid")]
impl Write for HidStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        // hidapi wants the report ID (always 0 here) in front of the report
        let n = buf.len().min(PACKET_SIZE);
        let mut report = [0u8; PACKET_SIZE + 1];
        report[1..=n].copy_from_slice(&buf[..n]);
        self.device.write(&report).map_err(std::io::Error::other)?;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Cursor;

    /// In-memory device: reads come from a prepared buffer, writes are
    /// captured.
    pub(crate) struct MockStream {
        pub input: Cursor<Vec<u8>>,
        pub output: Vec<u8>,
    }

    impl MockStream {
        pub(crate) fn new(input: Vec<u8>) -> Self {
            Self {
                input: Cursor::new(input),
                output: Vec::new(),
            }
        }
    }

    impl Read for MockStream {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for MockStream {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.output.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    /// Frame `msg` the way the device does when it answers.
    pub(crate) fn device_packets(msg: &[u8]) -> Vec<u8> {
        let mut framer = HidFramer::new(MockStream::new(Vec::new()));
        framer
            .write_message(msg)
            .expect("framing into memory cannot fail");
        framer.into_inner().output
    }

    fn roundtrip(msg: &[u8]) -> Result<(Vec<u8>, usize)> {
        let wire = device_packets(msg);
        let packets = wire.len() / PACKET_SIZE;

        let mut framer = HidFramer::new(MockStream::new(wire));
        let mut len = [0u8; 2];
        framer.read_exact(&mut len)?;
        let mut out = vec![0u8; u16::from_be_bytes(len) as usize];
        framer.read_exact(&mut out)?;
        Ok((out, packets))
    }

    #[test]
    fn test_write_single_packet() -> Result<()> {
        let mut framer = HidFramer::new(MockStream::new(Vec::new()));
        framer.write_message(&[0xE0, 0x01, 0x00, 0x00, 0x00])?;

        let out = &framer.get_ref().output;
        assert_eq!(out.len(), PACKET_SIZE);
        assert_eq!(
            &out[..12],
            &[
                0x01, 0x01, 0x05, 0x00, 0x00, 0x00, 0x05, 0xE0, 0x01, 0x00, 0x00, 0x00
            ]
        );
        assert!(out[12..].iter().all(|b| *b == 0));
        Ok(())
    }

    #[test]
    fn test_write_numbers_packets() -> Result<()> {
        let mut framer = HidFramer::new(MockStream::new(Vec::new()));
        // 58 + 2 length bytes = 60, one byte spills into a second packet
        framer.write_message(&[0xAB; 58])?;

        let out = &framer.get_ref().output;
        assert_eq!(out.len(), 2 * PACKET_SIZE);
        assert_eq!(&out[3..5], &[0x00, 0x00]);
        assert_eq!(&out[PACKET_SIZE + 3..PACKET_SIZE + 5], &[0x00, 0x01]);
        assert_eq!(out[PACKET_SIZE + 5], 0xAB);
        Ok(())
    }

    #[test]
    fn test_write_too_long() {
        let mut framer = HidFramer::new(MockStream::new(Vec::new()));
        let result = framer.write_message(&vec![0u8; 65536]);
        assert!(matches!(result, Err(Error::MessageTooLong(65536))));
        assert!(framer.get_ref().output.is_empty());
    }

    #[test]
    fn test_roundtrip_boundaries() -> Result<()> {
        for len in [0usize, 1, 57, 58, 59, 116, 117, 260, 65535] {
            let msg: Vec<u8> = (0..len).map(|i| i as u8).collect();
            let (out, packets) = roundtrip(&msg)?;
            assert_eq!(out, msg, "length {len}");
            assert_eq!(packets, packet_count(len), "length {len}");
        }
        Ok(())
    }

    #[test]
    fn test_bad_channel_rejected_first() {
        let mut wire = device_packets(&[1, 2, 3]);
        wire[0] = 0x02;
        wire[2] = 0x06; // tag is wrong too, channel wins
        wire[4] = 0x09;
        let mut framer = HidFramer::new(MockStream::new(wire));
        let mut buf = [0u8; 2];
        assert!(matches!(
            framer.read_exact(&mut buf),
            Err(Error::BadChannelId(0x0201))
        ));
    }

    #[test]
    fn test_bad_tag_rejected_before_sequence() {
        let mut wire = device_packets(&[1, 2, 3]);
        wire[2] = 0x06;
        wire[4] = 0x09;
        let mut framer = HidFramer::new(MockStream::new(wire));
        let mut buf = [0u8; 2];
        assert!(matches!(framer.read_exact(&mut buf), Err(Error::BadCommandTag(0x06))));
    }

    #[test]
    fn test_skipped_sequence_rejected() {
        let msg = vec![0x11; 100];
        let mut wire = device_packets(&msg);
        // second packet claims sequence 2
        wire[PACKET_SIZE + 4] = 0x02;
        let mut framer = HidFramer::new(MockStream::new(wire));
        let mut out = vec![0u8; 102];
        assert!(matches!(
            framer.read_exact(&mut out),
            Err(Error::BadSequence {
                expected: 1,
                actual: 2
            })
        ));
    }

    #[test]
    fn test_repeated_sequence_rejected() {
        let msg = vec![0x22; 100];
        let mut wire = device_packets(&msg);
        wire[PACKET_SIZE + 4] = 0x00;
        let mut framer = HidFramer::new(MockStream::new(wire));
        let mut out = vec![0u8; 102];
        assert!(matches!(
            framer.read_exact(&mut out),
            Err(Error::BadSequence {
                expected: 1,
                actual: 0
            })
        ));
    }

    #[test]
    fn test_short_packet_is_error() {
        let mut wire = device_packets(&[1, 2, 3]);
        wire.truncate(40);
        let mut framer = HidFramer::new(MockStream::new(wire));
        let mut buf = [0u8; 2];
        assert!(matches!(framer.read_exact(&mut buf), Err(Error::ShortPacket(40))));
    }

    #[test]
    fn test_read_drains_buffer_before_next_packet() -> Result<()> {
        let mut wire = device_packets(&[0x01; 10]);
        wire.extend(device_packets(&[0x02; 10]));
        let mut framer = HidFramer::new(MockStream::new(wire));

        // one small read pulls exactly one packet
        let mut buf = [0u8; 4];
        framer.read_exact(&mut buf)?;
        assert_eq!(buf, [0x00, 0x0A, 0x01, 0x01]);
        assert_eq!(framer.get_ref().input.position(), PACKET_SIZE as u64);

        // a large read returns only what is left of the current packet
        let mut rest = [0u8; 100];
        let n = framer.read(&mut rest)?;
        assert_eq!(n, FRAGMENT_SIZE - 4);
        Ok(())
    }

    #[test]
    fn test_reset_restarts_sequence() -> Result<()> {
        let mut wire = device_packets(&[0x01; 3]);
        wire.extend(device_packets(&[0x02; 3]));
        let mut framer = HidFramer::new(MockStream::new(wire));

        let mut buf = [0u8; 5];
        framer.read_exact(&mut buf)?;
        assert_eq!(buf, [0x00, 0x03, 0x01, 0x01, 0x01]);

        // without a reset the second message (sequence 0) would be rejected
        framer.reset();
        framer.read_exact(&mut buf)?;
        assert_eq!(buf, [0x00, 0x03, 0x02, 0x02, 0x02]);
        Ok(())
    }

    #[test]
    fn test_missing_reset_detected() {
        let mut wire = device_packets(&[0x01; 3]);
        wire.extend(device_packets(&[0x02; 3]));
        let mut framer = HidFramer::new(MockStream::new(wire));

        let mut buf = [0u8; PACKET_SIZE - HEADER_SIZE];
        assert!(framer.read_exact(&mut buf).is_ok());
        let mut more = [0u8; 1];
        assert!(matches!(
            framer.read_exact(&mut more),
            Err(Error::BadSequence {
                expected: 1,
                actual: 0
            })
        ));
    }

    proptest! {
        #[test]
        fn prop_frame_roundtrip(msg in prop::collection::vec(any::<u8>(), 0..2048)) {
            let (out, packets) = roundtrip(&msg).map_err(|e| TestCaseError::fail(e.to_string()))?;
            prop_assert_eq!(&out, &msg);
            prop_assert_eq!(packets, (msg.len() + 2).div_ceil(59));
        }
    }
}
