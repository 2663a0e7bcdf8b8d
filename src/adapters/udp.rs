//! UDP transport: one OSC packet per datagram.
//!
//! A device socket answers whoever spoke last, so replies and autosend
//! publications follow the most recent peer. A host socket is pinned to
//! one device address.

use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

use log::{debug, info};

use crate::osc::transport::Transport;

pub struct UdpTransport {
    socket: UdpSocket,
    peer: Option<SocketAddr>,
    pinned: bool,
}

impl UdpTransport {
    /// Device side: listen on `addr`, reply to the last sender.
    pub fn bind(addr: impl ToSocketAddrs) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_nonblocking(true)?;
        info!("IO: UDP listening on {}", socket.local_addr()?);
        Ok(Self {
            socket,
            peer: None,
            pinned: false,
        })
    }

    /// Host side: bind an ephemeral port and talk only to `device`.
    pub fn connect(device: impl ToSocketAddrs) -> io::Result<Self> {
        let device = device
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "no device address"))?;
        let local: SocketAddr = if device.is_ipv4() {
            ([0u8; 4], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        let socket = UdpSocket::bind(local)?;
        socket.set_nonblocking(true)?;
        Ok(Self {
            socket,
            peer: Some(device),
            pinned: true,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Where replies currently go.
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }
}

impl Transport for UdpTransport {
    type Error = io::Error;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, io::Error> {
        match self.socket.recv_from(buf) {
            Ok((n, from)) => {
                if self.pinned && Some(from) != self.peer {
                    debug!("IO: ignoring datagram from {}", from);
                    return Ok(0);
                }
                if self.peer != Some(from) {
                    info!("IO: peer is now {}", from);
                    self.peer = Some(from);
                }
                Ok(n)
            }
            // An ICMP unreachable from an earlier send surfaces here on
            // some platforms; it is not fatal for a connectionless socket.
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock
                        | io::ErrorKind::ConnectionReset
                        | io::ErrorKind::ConnectionRefused
                ) =>
            {
                Ok(0)
            }
            Err(e) => Err(e),
        }
    }

    fn write(&mut self, packet: &[u8]) -> Result<usize, io::Error> {
        match self.peer {
            Some(peer) => self.socket.send_to(packet, peer),
            None => {
                debug!("IO: no peer yet, dropping {} bytes", packet.len());
                Ok(0)
            }
        }
    }

    fn flush(&mut self) -> Result<(), io::Error> {
        Ok(())
    }

    fn available(&self) -> bool {
        let mut probe = [0u8; 1];
        self.socket.peek_from(&mut probe).is_ok()
    }
}
