//! Streaming Ogg demuxer.
//!
//! Reads pages from any [`Read`] without seeking and yields complete packets. One
//! logical stream is accepted; for Opus each packet is one audio frame after the
//! `OpusHead`/`OpusTags` header packets.

use std::collections::VecDeque;
use std::io::{self, Read};

use crate::error::OggError;

const CAPTURE: &[u8; 4] = b"OggS";
const HEADER_LEN: usize = 27;
const FLAG_CONTINUED: u8 = 0x01;
const FLAG_EOS: u8 = 0x04;

/// Incremental packet reader over an Ogg byte stream.
pub struct OggPacketReader<R> {
    reader: R,
    partial: Vec<u8>,
    ready: VecDeque<Vec<u8>>,
    serial: Option<u32>,
    finished: bool,
}

impl<R: Read> OggPacketReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            partial: Vec::new(),
            ready: VecDeque::new(),
            serial: None,
            finished: false,
        }
    }

    /// Next complete packet, or `None` at end of stream.
    pub fn next_packet(&mut self) -> Result<Option<Vec<u8>>, OggError> {
        loop {
            if let Some(packet) = self.ready.pop_front() {
                return Ok(Some(packet));
            }
            if self.finished {
                return Ok(None);
            }
            self.read_page()?;
        }
    }

    /// Fill `buf` completely. `Ok(false)` means clean EOF before the first byte.
    fn fill(&mut self, buf: &mut [u8]) -> Result<bool, OggError> {
        let mut offset = 0;
        while offset < buf.len() {
            match self.reader.read(&mut buf[offset..]) {
                Ok(0) if offset == 0 => return Ok(false),
                Ok(0) => return Err(OggError::Truncated),
                Ok(n) => offset += n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(true)
    }

    fn read_page(&mut self) -> Result<(), OggError> {
        let mut header = [0u8; HEADER_LEN];
        if !self.fill(&mut header)? {
            if !self.partial.is_empty() {
                return Err(OggError::Truncated);
            }
            self.finished = true;
            return Ok(());
        }
        if &header[0..4] != CAPTURE {
            return Err(OggError::BadCapture);
        }
        if header[4] != 0 {
            return Err(OggError::BadVersion(header[4]));
        }
        let flags = header[5];
        let serial = u32::from_le_bytes([header[14], header[15], header[16], header[17]]);
        match self.serial {
            Some(expected) if expected != serial => {
                return Err(OggError::UnexpectedSerial {
                    expected,
                    found: serial,
                });
            }
            Some(_) => {}
            None => self.serial = Some(serial),
        }

        let mut lacing = vec![0u8; header[26] as usize];
        if !self.fill(&mut lacing)? && !lacing.is_empty() {
            return Err(OggError::Truncated);
        }
        let body_len: usize = lacing.iter().map(|&len| len as usize).sum();
        let mut body = vec![0u8; body_len];
        if !self.fill(&mut body)? && body_len > 0 {
            return Err(OggError::Truncated);
        }

        if flags & FLAG_CONTINUED != 0 && self.partial.is_empty() {
            return Err(OggError::OrphanContinuation);
        }
        if flags & FLAG_CONTINUED == 0 {
            // A packet left open by the previous page was never finished.
            self.partial.clear();
        }

        let mut offset = 0;
        for &len in &lacing {
            let end = offset + len as usize;
            self.partial.extend_from_slice(&body[offset..end]);
            offset = end;
            if len < 255 {
                self.ready.push_back(std::mem::take(&mut self.partial));
            }
        }

        if flags & FLAG_EOS != 0 {
            self.finished = true;
        }
        Ok(())
    }
}

impl<R: Read> Iterator for OggPacketReader<R> {
    type Item = Result<Vec<u8>, OggError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_packet().transpose()
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::ogg_stream;
    use super::*;
    use std::io::Cursor;

    fn read_all(bytes: Vec<u8>) -> Result<Vec<Vec<u8>>, OggError> {
        OggPacketReader::new(Cursor::new(bytes)).collect()
    }

    #[test]
    fn reads_packets_in_order() {
        let packets = vec![b"one".to_vec(), b"two".to_vec(), vec![]];
        assert_eq!(read_all(ogg_stream(1, &packets)).unwrap(), packets);
    }

    #[test]
    fn reassembles_packets_spanning_pages() {
        let big: Vec<u8> = (0..70_000u32).map(|i| (i % 251) as u8).collect();
        let exact = vec![7u8; 510];
        let packets = vec![big, exact, b"tail".to_vec()];
        assert_eq!(read_all(ogg_stream(1, &packets)).unwrap(), packets);
    }

    #[test]
    fn empty_input_is_clean_eof() {
        assert!(read_all(Vec::new()).unwrap().is_empty());
    }

    #[test]
    fn rejects_garbage() {
        let err = read_all(b"not an ogg stream at all....".to_vec()).unwrap_err();
        assert!(matches!(err, OggError::BadCapture));
    }

    #[test]
    fn rejects_truncated_page() {
        let mut bytes = ogg_stream(1, &[b"hello world".to_vec()]);
        bytes.truncate(bytes.len() - 3);
        assert!(matches!(read_all(bytes).unwrap_err(), OggError::Truncated));
    }

    #[test]
    fn rejects_second_logical_stream() {
        let mut bytes = ogg_stream(1, &[b"a".to_vec()]);
        bytes.extend(ogg_stream(2, &[b"b".to_vec()]));
        let err = read_all(bytes).unwrap_err();
        assert!(matches!(err, OggError::UnexpectedSerial { expected: 1, found: 2 }));
    }

    #[test]
    fn stops_at_end_of_stream_flag() {
        let mut bytes = ogg_stream(1, &[b"a".to_vec()]);
        bytes.extend_from_slice(b"trailing junk");
        assert_eq!(read_all(bytes).unwrap(), vec![b"a".to_vec()]);
    }
}
