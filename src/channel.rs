//! Module for byte-level communication channels with a VCI adapter
//!
//! A [Transport] is one physical link (serial line, USB bulk pipe or TCP
//! socket). It is the only layer of the crate permitted to touch OS handles;
//! everything above it works in terms of framed messages.

use std::sync::Arc;

/// Communication channel result
pub type ChannelResult<T> = Result<T, ChannelError>;

#[derive(Debug, Clone, thiserror::Error)]
/// Error produced by a communication channel
pub enum ChannelError {
    /// Underlying IO Error with channel
    #[error("IO error")]
    IOError(
        #[from]
        #[source]
        Arc<std::io::Error>,
    ),
    /// Timeout when writing data to the channel
    #[error("timeout writing to channel")]
    WriteTimeout,
    /// Timeout when reading from the channel. For most callers this is a
    /// normal outcome (an ECU that stays silent), not a fault
    #[error("timeout reading from channel")]
    ReadTimeout,
    /// Unsupported channel request
    #[error("unsupported channel request")]
    UnsupportedRequest,
    /// The interface is not open
    #[error("channel's interface is not open")]
    InterfaceNotOpen,
    /// Underlying API error with hardware
    #[error("underlying {api_name} API error: {desc}")]
    APIError {
        /// Name of the API, EG: 'serialport', 'nusb'
        api_name: String,
        /// API error description
        desc: String,
    },
}

pub(crate) fn convert_io_error(error: std::io::Error) -> ChannelError {
    ChannelError::IOError(Arc::new(error))
}

/// Address of one physical link, tagged by medium.
///
/// Carried explicitly rather than encoded in a string so connect logic can
/// match on the kind instead of probing prefixes at runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TransportTarget {
    /// Serial port path and baud rate
    Serial {
        /// OS port path (`/dev/ttyUSB0`, `COM3`)
        port: String,
        /// Baud rate
        baud: u32,
    },
    /// USB device by vendor/product ID
    Usb {
        /// Vendor ID
        vid: u16,
        /// Product ID
        pid: u16,
    },
    /// TCP endpoint (DOIP and HTTP probes)
    Tcp {
        /// Host address
        host: String,
        /// TCP port
        port: u16,
    },
}

/// Base trait for one physical link with a VCI adapter.
///
/// All blocking calls take explicit timeouts so no operation can stall a
/// caller indefinitely. Opening twice and closing twice are both allowed;
/// `close` on an already-closed transport is a no-op.
pub trait Transport: Send {
    /// Opens the physical link
    fn open(&mut self) -> ChannelResult<()>;

    /// Closes the physical link. Idempotent.
    fn close(&mut self) -> ChannelResult<()>;

    /// Returns true whilst the link is open
    fn is_open(&self) -> bool;

    /// Writes raw bytes to the link
    fn send_bytes(&mut self, buffer: &[u8]) -> ChannelResult<()>;

    /// Attempts to read bytes from the link, waiting up to `timeout_ms`.
    /// Returns [ChannelError::ReadTimeout] if nothing arrived in time.
    fn read_bytes(&mut self, timeout_ms: u32) -> ChannelResult<Vec<u8>>;

    /// Writes a request then waits for whatever the link sends back
    fn send_recv_bytes(&mut self, buffer: &[u8], timeout_ms: u32) -> ChannelResult<Vec<u8>> {
        self.send_bytes(buffer)?;
        self.read_bytes(timeout_ms)
    }
}
