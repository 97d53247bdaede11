//! UDP broadcast transport. The one piece of the protocol genuinely tied to
//! an operating system socket; everything else in `syncjams-core` only
//! knows about the [`syncjams_core::Transport`] trait.

use std::net::{Ipv4Addr, SocketAddr, UdpSocket};

use socket2::{Domain, Socket, Type};
use syncjams_core::Transport;

use crate::error::Error;

/// The limited broadcast address, always included alongside any
/// caller-configured subnet broadcast destinations.
pub const LIMITED_BROADCAST: Ipv4Addr = Ipv4Addr::new(255, 255, 255, 255);

pub struct UdpTransport {
    socket: UdpSocket,
    destinations: Vec<SocketAddr>,
    buf: Vec<u8>,
}

impl UdpTransport {
    /// Bind a broadcast-capable, non-blocking UDP socket on `port`, fanning
    /// outbound datagrams out to every address in `destinations`.
    pub fn bind(port: u16, destinations: Vec<Ipv4Addr>) -> Result<Self, Error> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, None)?;
        socket.set_reuse_address(true)?;
        #[cfg(unix)]
        socket.set_reuse_port(true)?;
        socket.set_broadcast(true)?;
        socket.set_multicast_ttl_v4(255)?;
        socket.bind(&SocketAddr::from(([0, 0, 0, 0], port)).into())?;
        socket.set_nonblocking(true)?;

        let destinations = destinations
            .into_iter()
            .map(|addr| SocketAddr::from((addr, port)))
            .collect();

        Ok(Self {
            socket: socket.into(),
            destinations,
            buf: vec![0u8; 8192],
        })
    }
}

impl Transport for UdpTransport {
    fn send_all(&mut self, datagram: &[u8]) {
        for dest in &self.destinations {
            if let Err(err) = self.socket.send_to(datagram, dest) {
                log::warn!("udp send to {dest} failed: {err}");
            }
        }
    }

    fn try_recv(&mut self) -> Option<Vec<u8>> {
        match self.socket.recv_from(&mut self.buf) {
            Ok((n, _src)) => Some(self.buf[..n].to_vec()),
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => None,
            Err(err) => {
                log::warn!("udp recv failed: {err}");
                None
            }
        }
    }
}
