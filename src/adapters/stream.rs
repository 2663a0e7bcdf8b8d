//! Stream transport: length-prefixed packets over any `Read + Write`.
//!
//! Intended for TCP. Reads should be configured to time out quickly
//! (`TcpStream::set_read_timeout`) so the I/O task can keep polling; a
//! timed-out read reports "nothing pending". End of stream is an error
//! and ends the session.

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use crate::osc::framing::{FrameDecoder, encode_frame};
use crate::osc::transport::Transport;

pub struct StreamTransport<S> {
    stream: S,
    decoder: FrameDecoder,
    pending: Vec<u8>,
    chunk: Vec<u8>,
    max_frame: usize,
}

impl<S: Read + Write> StreamTransport<S> {
    pub fn new(stream: S, max_frame: usize) -> Self {
        Self {
            stream,
            decoder: FrameDecoder::new(max_frame),
            pending: Vec::new(),
            chunk: vec![0; max_frame.max(64)],
            max_frame,
        }
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    /// Next complete packet already sitting in `pending`.
    fn next_buffered(&mut self, buf: &mut [u8]) -> Option<usize> {
        if self.pending.is_empty() {
            return None;
        }
        match self.decoder.feed(&self.pending) {
            Some((payload, used)) => {
                let n = payload.len().min(buf.len());
                buf[..n].copy_from_slice(&payload[..n]);
                self.pending.drain(..used);
                Some(n)
            }
            None => {
                // Everything was absorbed into the decoder's partial state.
                self.pending.clear();
                None
            }
        }
    }
}

impl StreamTransport<TcpStream> {
    /// Wrap an accepted TCP connection, polling reads every `poll`.
    pub fn tcp(stream: TcpStream, max_frame: usize, poll: Duration) -> io::Result<Self> {
        stream.set_read_timeout(Some(poll))?;
        stream.set_nodelay(true)?;
        Ok(Self::new(stream, max_frame))
    }
}

impl<S: Read + Write> Transport for StreamTransport<S> {
    type Error = io::Error;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, io::Error> {
        if let Some(n) = self.next_buffered(buf) {
            return Ok(n);
        }
        let got = match self.stream.read(&mut self.chunk) {
            Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
            Ok(n) => n,
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
                ) =>
            {
                return Ok(0);
            }
            Err(e) => return Err(e),
        };
        self.pending.extend_from_slice(&self.chunk[..got]);
        Ok(self.next_buffered(buf).unwrap_or(0))
    }

    fn write(&mut self, packet: &[u8]) -> Result<usize, io::Error> {
        let frame = encode_frame(packet, self.max_frame).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "packet does not fit a frame")
        })?;
        self.stream.write_all(&frame)?;
        Ok(packet.len())
    }

    fn flush(&mut self) -> Result<(), io::Error> {
        self.stream.flush()
    }

    fn available(&self) -> bool {
        !self.pending.is_empty()
    }
}
