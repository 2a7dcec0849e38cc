//! Loopback transport for exercising the gateway without radio hardware.
//!
//! Members join a well-known UDP multicast group; every payload published
//! to the group is delivered to every member. No framing is applied: one
//! datagram is one frame.

use std::io;
use std::net::{Ipv4Addr, UdpSocket};
use std::time::Duration;

use crate::radio::{RadioTransport, TransportError, FIFO_CAPACITY};

const GROUP_ADDR: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 1);
const GROUP_PORT: u16 = 9999;

pub struct SimulatedTransport {
    socket: UdpSocket,
}

impl SimulatedTransport {
    /// Join the delivery group.
    pub fn join() -> io::Result<Self> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, GROUP_PORT))?;
        socket.join_multicast_v4(&GROUP_ADDR, &Ipv4Addr::UNSPECIFIED)?;
        Ok(Self { socket })
    }

    /// Deliver one frame to every group member, this transport included.
    pub fn publish(&self, payload: &[u8]) -> io::Result<()> {
        debug_assert!(payload.len() <= FIFO_CAPACITY);
        self.socket.send_to(payload, (GROUP_ADDR, GROUP_PORT))?;
        Ok(())
    }
}

impl RadioTransport for SimulatedTransport {
    fn recv_timeout(
        &mut self,
        timeout: Duration,
        buf: &mut [u8],
    ) -> Result<Option<usize>, TransportError> {
        self.socket.set_read_timeout(Some(timeout))?;

        match self.socket.recv_from(buf) {
            Ok((n, _)) => Ok(Some(n)),
            Err(e)
                if e.kind() == io::ErrorKind::WouldBlock
                    || e.kind() == io::ErrorKind::TimedOut =>
            {
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.socket
            .leave_multicast_v4(&GROUP_ADDR, &Ipv4Addr::UNSPECIFIED)?;
        Ok(())
    }
}
