//! The hardware module contains the physical transports used to reach VCI
//! adapters (serial, TCP, USB bulk) and the GT100 device discovery and
//! connection state machine built on top of them.

pub mod gt100;
pub mod serial;
pub mod tcp;
pub mod usb;

use std::time::Duration;

use crate::channel::{ChannelError, ChannelResult, Transport, TransportTarget};

/// Default TCP connect timeout used when a target does not carry its own
const DEFAULT_TCP_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Builds the concrete transport for a [TransportTarget]. The link is not
/// opened; callers decide when to touch the hardware.
pub fn create_transport(target: &TransportTarget) -> ChannelResult<Box<dyn Transport>> {
    Ok(match target {
        TransportTarget::Serial { port, baud } => {
            Box::new(serial::SerialTransport::new(port, *baud))
        }
        TransportTarget::Usb { vid, pid } => Box::new(usb::UsbTransport::new(*vid, *pid)),
        TransportTarget::Tcp { host, port } => Box::new(tcp::TcpTransport::new(
            host,
            *port,
            DEFAULT_TCP_CONNECT_TIMEOUT,
        )?),
    })
}

/// Hardware API result
pub type HardwareResult<T> = Result<T, HardwareError>;

#[derive(Debug, Clone, thiserror::Error)]
/// Represents errors that can be returned by the hardware API
pub enum HardwareError {
    /// Hardware not found
    #[error("Device not found")]
    DeviceNotFound,
    /// Function called on a device that has not been connected
    #[error("Hardware device not connected")]
    DeviceNotConnected,
    /// Operation is only valid in a different connection state
    #[error("Operation invalid in state '{state}'")]
    InvalidState {
        /// The state the device was actually in
        state: String,
    },
    /// A device scan is already running on this manager
    #[error("Device scan already in progress")]
    ScanInProgress,
    /// The remote end rejected or failed the DOIP activation exchange
    #[error("DOIP activation rejected by device")]
    ActivationRejected,
    /// A probed or connected device did not identify as supported hardware
    #[error("Device identification failed")]
    IdentificationFailed,
    /// The device answered an AT command with something other than OK
    #[error("Device rejected command")]
    CommandRejected,
    /// Error with the underlying communication channel
    #[error("Hardware channel error")]
    Channel(
        #[from]
        #[source]
        ChannelError,
    ),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_covers_every_target_kind() {
        let serial = create_transport(&TransportTarget::Serial {
            port: "/dev/ttyUSB0".to_string(),
            baud: 115200,
        })
        .unwrap();
        assert!(!serial.is_open());

        let usb = create_transport(&TransportTarget::Usb {
            vid: 0x1EAB,
            pid: 0x9001,
        })
        .unwrap();
        assert!(!usb.is_open());

        let tcp = create_transport(&TransportTarget::Tcp {
            host: "127.0.0.1".to_string(),
            port: 13400,
        })
        .unwrap();
        assert!(!tcp.is_open());
    }
}
