//! TCP transport for the DOIP/Ethernet path and HTTP identification probes

use std::{
    io::{ErrorKind, Read, Write},
    net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs},
    time::Duration,
};

use crate::channel::{ChannelError, ChannelResult, Transport, convert_io_error};

/// Receive buffer size. The DOIP activation response and the HTTP banner
/// both fit comfortably in one read.
const RX_BUFFER_SIZE: usize = 1024;

/// TCP transport
#[derive(Debug)]
pub struct TcpTransport {
    addr: SocketAddr,
    connect_timeout: Duration,
    stream: Option<TcpStream>,
}

impl TcpTransport {
    /// Creates a transport for `host:port`, resolving the address eagerly
    pub fn new(host: &str, port: u16, connect_timeout: Duration) -> ChannelResult<Self> {
        let addr = (host, port)
            .to_socket_addrs()
            .map_err(convert_io_error)?
            .next()
            .ok_or(ChannelError::UnsupportedRequest)?;
        Ok(Self {
            addr,
            connect_timeout,
            stream: None,
        })
    }

    /// Remote endpoint this transport targets
    pub fn peer_addr(&self) -> SocketAddr {
        self.addr
    }
}

impl Transport for TcpTransport {
    fn open(&mut self) -> ChannelResult<()> {
        if self.stream.is_some() {
            return Ok(());
        }
        let stream =
            TcpStream::connect_timeout(&self.addr, self.connect_timeout).map_err(convert_io_error)?;
        stream.set_nodelay(true).map_err(convert_io_error)?;
        log::debug!("TCP connected to {}", self.addr);
        self.stream = Some(stream);
        Ok(())
    }

    fn close(&mut self) -> ChannelResult<()> {
        if let Some(stream) = self.stream.take() {
            // Peer may already be gone; a failed shutdown is not an error
            let _ = stream.shutdown(Shutdown::Both);
            log::debug!("TCP disconnected from {}", self.addr);
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn send_bytes(&mut self, buffer: &[u8]) -> ChannelResult<()> {
        match &mut self.stream {
            Some(s) => s.write_all(buffer).map_err(convert_io_error),
            None => Err(ChannelError::InterfaceNotOpen),
        }
    }

    fn read_bytes(&mut self, timeout_ms: u32) -> ChannelResult<Vec<u8>> {
        let stream = self.stream.as_mut().ok_or(ChannelError::InterfaceNotOpen)?;
        stream
            .set_read_timeout(Some(Duration::from_millis(timeout_ms.max(1) as u64)))
            .map_err(convert_io_error)?;
        let mut buf = vec![0u8; RX_BUFFER_SIZE];
        match stream.read(&mut buf) {
            Ok(0) => Err(ChannelError::ReadTimeout), // Peer closed without data
            Ok(n) => {
                buf.truncate(n);
                Ok(buf)
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                Err(ChannelError::ReadTimeout)
            }
            Err(e) => Err(convert_io_error(e)),
        }
    }
}
