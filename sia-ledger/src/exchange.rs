//! APDU exchangers: HID-framed for USB devices, length-prefixed for TCP
//! (e.g. the Speculos emulator)

use crate::apdu::Apdu;
use crate::error::{Error, Result};
use crate::hid::HidFramer;
use log::{debug, info};
use std::io::{ErrorKind, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};

/// Sends one APDU and returns the raw response, status word included.
///
/// The request is fully written before any read starts and the response
/// is fully read before returning.
pub trait Exchange {
    fn exchange(&mut self, apdu: &Apdu) -> Result<Vec<u8>>;
}

impl<E: Exchange + ?Sized> Exchange for Box<E> {
    fn exchange(&mut self, apdu: &Apdu) -> Result<Vec<u8>> {
        (**self).exchange(apdu)
    }
}

/// Settings fixed when an exchanger is built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExchangeOptions {
    /// Log every raw request and response as hex at info level.
    pub trace: bool,
}

/// APDU exchange over HID reports.
pub struct HidExchanger<T> {
    framer: HidFramer<T>,
    options: ExchangeOptions,
}

impl<T: Read + Write> HidExchanger<T> {
    pub fn new(transport: T, options: ExchangeOptions) -> Self {
        Self {
            framer: HidFramer::new(transport),
            options,
        }
    }

    pub fn get_ref(&self) -> &T {
        self.framer.get_ref()
    }
}

impl<T: Read + Write> Exchange for HidExchanger<T> {
    fn exchange(&mut self, apdu: &Apdu) -> Result<Vec<u8>> {
        let encoded = apdu.encode();
        if self.options.trace {
            info!("HID <= {}", hex::encode(&encoded));
        }

        self.framer.reset();
        self.framer.write_message(&encoded)?;

        let mut len = [0u8; 2];
        self.framer.read_exact(&mut len)?;
        let mut resp = vec![0u8; u16::from_be_bytes(len) as usize];
        self.framer.read_exact(&mut resp)?;

        if self.options.trace {
            info!("HID => {}", hex::encode(&resp));
        }
        Ok(resp)
    }
}

/// APDU exchange over a persistent stream with 4-byte big-endian length
/// prefixes.
pub struct TcpExchanger<S> {
    stream: S,
    options: ExchangeOptions,
}

impl TcpExchanger<TcpStream> {
    pub fn connect(addr: impl ToSocketAddrs, options: ExchangeOptions) -> Result<Self> {
        let stream = TcpStream::connect(addr)?;
        debug!("Connected to APDU server at {:?}", stream.peer_addr().ok());
        Ok(Self::new(stream, options))
    }
}

impl<S: Read + Write> TcpExchanger<S> {
    pub fn new(stream: S, options: ExchangeOptions) -> Self {
        Self { stream, options }
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }
}

impl<S: Read + Write> Exchange for TcpExchanger<S> {
    fn exchange(&mut self, apdu: &Apdu) -> Result<Vec<u8>> {
        let encoded = apdu.encode();
        if self.options.trace {
            info!("TCP <= {}", hex::encode(&encoded));
        }

        let mut request = Vec::with_capacity(4 + encoded.len());
        request.extend_from_slice(&(encoded.len() as u32).to_be_bytes());
        request.extend_from_slice(&encoded);
        self.stream.write_all(&request)?;
        self.stream.flush()?;

        // the declared length excludes the status word
        let mut len = [0u8; 4];
        self.stream.read_exact(&mut len)?;
        let resp_len = u32::from_be_bytes(len).wrapping_add(2) as usize;

        let mut resp = Vec::new();
        (&mut self.stream)
            .take(resp_len as u64)
            .read_to_end(&mut resp)?;
        if resp.len() != resp_len {
            return Err(Error::Io(std::io::Error::new(
                ErrorKind::UnexpectedEof,
                format!("expected {resp_len} response bytes, got {}", resp.len()),
            )));
        }

        if self.options.trace {
            info!("TCP => {}", hex::encode(&resp));
        }
        Ok(resp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hid::tests::{MockStream, device_packets};
    use crate::hid::{PACKET_SIZE, packet_count};

    fn version_apdu() -> Apdu {
        Apdu::new(0xE0, 0x01, 0x00, 0x00, Vec::new())
    }

    #[test]
    fn test_hid_exchange() -> Result<()> {
        let wire = device_packets(&[0x01, 0x02, 0x03, 0x90, 0x00]);
        let mut exchanger = HidExchanger::new(MockStream::new(wire), ExchangeOptions::default());

        let resp = exchanger.exchange(&version_apdu())?;
        assert_eq!(resp, vec![0x01, 0x02, 0x03, 0x90, 0x00]);

        let sent = &exchanger.get_ref().output;
        assert_eq!(sent.len(), PACKET_SIZE);
        assert_eq!(&sent[5..12], &[0x00, 0x05, 0xE0, 0x01, 0x00, 0x00, 0x00]);
        Ok(())
    }

    #[test]
    fn test_hid_exchange_multi_packet_response() -> Result<()> {
        let mut body: Vec<u8> = (0..100u8).collect();
        body.extend_from_slice(&[0x90, 0x00]);
        let wire = device_packets(&body);
        assert_eq!(wire.len(), packet_count(body.len()) * PACKET_SIZE);

        let options = ExchangeOptions { trace: true };
        let mut exchanger = HidExchanger::new(MockStream::new(wire), options);
        assert_eq!(exchanger.exchange(&version_apdu())?, body);
        Ok(())
    }

    #[test]
    fn test_hid_sequence_resets_between_exchanges() -> Result<()> {
        let mut wire = device_packets(&[0x90, 0x00]);
        wire.extend(device_packets(&[0x69, 0x85]));
        let mut exchanger = HidExchanger::new(MockStream::new(wire), ExchangeOptions::default());

        assert_eq!(exchanger.exchange(&version_apdu())?, vec![0x90, 0x00]);
        assert_eq!(exchanger.exchange(&version_apdu())?, vec![0x69, 0x85]);

        // both requests were numbered from zero
        let sent = &exchanger.get_ref().output;
        assert_eq!(&sent[3..5], &[0x00, 0x00]);
        assert_eq!(&sent[PACKET_SIZE + 3..PACKET_SIZE + 5], &[0x00, 0x00]);
        Ok(())
    }

    #[test]
    fn test_hid_truncated_response() {
        let mut wire = device_packets(&[0xAA; 100]);
        wire.truncate(PACKET_SIZE);
        let mut exchanger = HidExchanger::new(MockStream::new(wire), ExchangeOptions::default());
        assert!(matches!(
            exchanger.exchange(&version_apdu()),
            Err(Error::ShortPacket(0))
        ));
    }

    fn tcp_response(declared: u32, body: &[u8]) -> Vec<u8> {
        let mut wire = declared.to_be_bytes().to_vec();
        wire.extend_from_slice(body);
        wire
    }

    #[test]
    fn test_tcp_exchange() -> Result<()> {
        let wire = tcp_response(3, &[0x00, 0x04, 0x01, 0x90, 0x00]);
        let mut exchanger = TcpExchanger::new(MockStream::new(wire), ExchangeOptions::default());

        let resp = exchanger.exchange(&version_apdu())?;
        assert_eq!(resp, vec![0x00, 0x04, 0x01, 0x90, 0x00]);
        assert_eq!(
            exchanger.get_ref().output,
            vec![0x00, 0x00, 0x00, 0x05, 0xE0, 0x01, 0x00, 0x00, 0x00]
        );
        Ok(())
    }

    #[test]
    fn test_tcp_reads_declared_plus_two() -> Result<()> {
        // trailing bytes belong to the next response and must stay unread
        let mut wire = tcp_response(1, &[0x07, 0x90, 0x00]);
        wire.extend_from_slice(&[0xFF, 0xFF]);
        let mut exchanger = TcpExchanger::new(MockStream::new(wire), ExchangeOptions::default());

        assert_eq!(exchanger.exchange(&version_apdu())?, vec![0x07, 0x90, 0x00]);
        assert_eq!(exchanger.get_ref().input.position(), 7);
        Ok(())
    }

    #[test]
    fn test_tcp_short_stream() {
        let wire = tcp_response(10, &[0x01, 0x02]);
        let mut exchanger = TcpExchanger::new(MockStream::new(wire), ExchangeOptions::default());
        match exchanger.exchange(&version_apdu()) {
            Err(Error::Io(e)) => assert_eq!(e.kind(), ErrorKind::UnexpectedEof),
            other => panic!("expected transport error, got {other:?}"),
        }
    }

    #[test]
    fn test_tcp_missing_length() {
        let mut exchanger =
            TcpExchanger::new(MockStream::new(vec![0x00, 0x00]), ExchangeOptions::default());
        assert!(matches!(exchanger.exchange(&version_apdu()), Err(Error::Io(_))));
    }
}
