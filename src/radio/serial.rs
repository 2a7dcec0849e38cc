//! Marker+length framing for a radio attached through an intermediary
//! controller over a serial link.
//!
//! Wire format: `"PKT" | LEN(1 byte) | PAYLOAD(LEN bytes)`. The framer
//! resynchronizes after joining a stream mid-frame: garbage ahead of a
//! marker is discarded wholesale rather than shifted out a byte at a
//! time, and a marker split across reads still frames correctly.

use std::io::{self, Read};
use std::time::Duration;

use crate::radio::{RadioTransport, TransportError};

/// Frame start marker on the serial wire.
pub const FRAME_MARKER: [u8; 3] = *b"PKT";

const HEADER_LEN: usize = FRAME_MARKER.len() + 1;
const READ_CHUNK: usize = 512;

/// Accumulating frame reader over any byte stream.
///
/// Generic over [`Read`] so framing and resynchronization are testable
/// on in-memory streams; the production transport feeds it a serial
/// port.
pub struct SerialFramer<R> {
    inner: R,
    buf: Vec<u8>,
    resyncs: u64,
}

impl<R: Read> SerialFramer<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: Vec::new(),
            resyncs: 0,
        }
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Times the framer had to discard buffered input to find a marker.
    pub fn resync_count(&self) -> u64 {
        self.resyncs
    }

    /// Block until one well-formed frame is available, copying its
    /// payload into `out` (truncated to `out`'s capacity) and returning
    /// the stored length.
    ///
    /// No internal bound on resynchronization attempts; callers needing
    /// a deadline wrap the underlying reader with one.
    pub fn read_frame(&mut self, out: &mut [u8]) -> io::Result<usize> {
        loop {
            if let Some(n) = self.extract_frame(out) {
                return Ok(n);
            }

            let mut chunk = [0u8; READ_CHUNK];
            let n = self.inner.read(&mut chunk)?;
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "serial stream closed",
                ));
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

    /// Try to parse one frame out of the accumulated buffer, discarding
    /// any leading garbage. Returns None when more bytes are needed.
    fn extract_frame(&mut self, out: &mut [u8]) -> Option<usize> {
        self.resynchronize();

        if self.buf.len() < HEADER_LEN {
            return None;
        }

        let payload_len = self.buf[FRAME_MARKER.len()] as usize;
        if self.buf.len() < HEADER_LEN + payload_len {
            return None;
        }

        let n = payload_len.min(out.len());
        out[..n].copy_from_slice(&self.buf[HEADER_LEN..HEADER_LEN + n]);
        self.buf.drain(..HEADER_LEN + payload_len);

        Some(n)
    }

    /// Drop everything ahead of the first marker. When no marker start
    /// survives anywhere in the buffer, the whole buffer is reset (only
    /// a trailing partial marker is kept, so a marker split across two
    /// reads is not lost).
    fn resynchronize(&mut self) {
        if self.buf.len() < FRAME_MARKER.len() {
            return;
        }
        if self.buf.starts_with(&FRAME_MARKER) {
            return;
        }

        match self
            .buf
            .windows(FRAME_MARKER.len())
            .position(|w| w == FRAME_MARKER)
        {
            Some(pos) => {
                self.buf.drain(..pos);
            }
            None => {
                let keep = (1..FRAME_MARKER.len())
                    .rev()
                    .find(|&k| self.buf.ends_with(&FRAME_MARKER[..k]))
                    .unwrap_or(0);
                self.buf.drain(..self.buf.len() - keep);
            }
        }
        self.resyncs += 1;
    }
}

/// Serial-attached transport: a [`SerialFramer`] over a serial port at
/// the controller's fixed baud rate.
pub struct SerialTransport {
    framer: SerialFramer<Box<dyn serialport::SerialPort>>,
}

impl SerialTransport {
    pub fn open(path: &str, baud_rate: u32) -> Result<Self, TransportError> {
        let port = serialport::new(path, baud_rate)
            .timeout(Duration::from_millis(500))
            .open()
            .map_err(io::Error::from)?;

        Ok(Self {
            framer: SerialFramer::new(port),
        })
    }
}

impl RadioTransport for SerialTransport {
    fn recv_timeout(
        &mut self,
        timeout: Duration,
        buf: &mut [u8],
    ) -> Result<Option<usize>, TransportError> {
        self.framer
            .get_mut()
            .set_timeout(timeout)
            .map_err(io::Error::from)?;

        match self.framer.read_frame(buf) {
            Ok(n) => Ok(Some(n)),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn close(&mut self) -> Result<(), TransportError> {
        // Dropping the port handle releases it; nothing further to do.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_frame_passes_through() {
        let stream: &[u8] = b"PKT\x03ABC";
        let mut framer = SerialFramer::new(stream);
        let mut out = [0u8; 64];

        let n = framer.read_frame(&mut out).unwrap();
        assert_eq!(&out[..n], b"ABC");
        assert_eq!(framer.resync_count(), 0);
    }

    #[test]
    fn leading_garbage_is_discarded_wholesale() {
        let stream: &[u8] = b"XXPKT\x03ABC";
        let mut framer = SerialFramer::new(stream);
        let mut out = [0u8; 64];

        let n = framer.read_frame(&mut out).unwrap();
        assert_eq!(&out[..n], b"ABC");
        assert_eq!(framer.resync_count(), 1);
    }

    #[test]
    fn marker_split_across_reads_still_frames() {
        // A reader that hands back the stream two bytes at a time forces
        // the marker to straddle read boundaries.
        struct Dribble<'a>(&'a [u8]);
        impl Read for Dribble<'_> {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                let n = self.0.len().min(buf.len()).min(2);
                buf[..n].copy_from_slice(&self.0[..n]);
                self.0 = &self.0[n..];
                Ok(n)
            }
        }

        let mut framer = SerialFramer::new(Dribble(b"PKT\x03ABC"));
        let mut out = [0u8; 64];

        let n = framer.read_frame(&mut out).unwrap();
        assert_eq!(&out[..n], b"ABC");
    }

    #[test]
    fn garbage_then_split_marker_keeps_partial_marker() {
        struct TwoReads {
            chunks: Vec<Vec<u8>>,
        }
        impl Read for TwoReads {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                if self.chunks.is_empty() {
                    return Ok(0);
                }
                let chunk = self.chunks.remove(0);
                buf[..chunk.len()].copy_from_slice(&chunk);
                Ok(chunk.len())
            }
        }

        let reader = TwoReads {
            chunks: vec![b"junkPK".to_vec(), b"T\x02hi".to_vec()],
        };
        let mut framer = SerialFramer::new(reader);
        let mut out = [0u8; 64];

        let n = framer.read_frame(&mut out).unwrap();
        assert_eq!(&out[..n], b"hi");
    }

    #[test]
    fn back_to_back_frames() {
        let stream: &[u8] = b"PKT\x01aPKT\x02bc";
        let mut framer = SerialFramer::new(stream);
        let mut out = [0u8; 64];

        let n = framer.read_frame(&mut out).unwrap();
        assert_eq!(&out[..n], b"a");
        let n = framer.read_frame(&mut out).unwrap();
        assert_eq!(&out[..n], b"bc");
    }

    #[test]
    fn oversized_payload_truncates_to_caller_buffer() {
        let mut stream = b"PKT\x05hello".to_vec();
        stream.extend_from_slice(b"PKT\x01z");
        let mut framer = SerialFramer::new(stream.as_slice());
        let mut out = [0u8; 3];

        let n = framer.read_frame(&mut out).unwrap();
        assert_eq!(&out[..n], b"hel");

        // The remainder of the truncated frame must not bleed into the
        // next one.
        let n = framer.read_frame(&mut out).unwrap();
        assert_eq!(&out[..n], b"z");
    }

    #[test]
    fn stream_end_reports_eof() {
        let stream: &[u8] = b"PKT\x05ab";
        let mut framer = SerialFramer::new(stream);
        let mut out = [0u8; 64];

        let err = framer.read_frame(&mut out).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
