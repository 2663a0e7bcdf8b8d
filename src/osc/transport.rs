//! Transport abstraction — any packet-carrying channel.
//!
//! Concrete implementations:
//! - UDP socket, one packet per datagram ([`crate::adapters::udp`])
//! - byte stream with length-prefix framing ([`crate::adapters::stream`])
//!
//! Framing is the transport's job: `read` yields exactly one whole packet
//! and `write` sends exactly one. The dispatcher and the autosender never
//! see partial packets.

/// Packet-oriented transport channel.
pub trait Transport {
    /// Error type for this transport.
    type Error: core::fmt::Debug;

    /// Read one packet into `buf`.
    /// Returns the packet length, or 0 if nothing is pending (non-blocking).
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;

    /// Send one packet. Returns the number of bytes written.
    fn write(&mut self, packet: &[u8]) -> Result<usize, Self::Error>;

    /// Flush any buffered output.
    fn flush(&mut self) -> Result<(), Self::Error>;

    /// Check if data is available for reading.
    fn available(&self) -> bool;
}

/// A null transport that discards all writes and never reads.
pub struct NullTransport;

impl Transport for NullTransport {
    type Error = ();

    fn read(&mut self, _buf: &mut [u8]) -> Result<usize, ()> {
        Ok(0)
    }

    fn write(&mut self, packet: &[u8]) -> Result<usize, ()> {
        Ok(packet.len())
    }

    fn flush(&mut self) -> Result<(), ()> {
        Ok(())
    }

    fn available(&self) -> bool {
        false
    }
}
