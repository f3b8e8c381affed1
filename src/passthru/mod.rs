//! The passthru API (Also known as SAE J2534) models a logical protocol
//! channel over a VCI adapter.
//!
//! Lifecycle is always `open -> connect(protocol) -> send/read ->
//! disconnect -> close`. Channel IDs are assigned monotonically per device
//! instance and are never reused while the device value is alive, so a
//! stale ID can never alias a newer channel.

mod godiag;
mod mock;

pub use godiag::GodiagPassthru;
pub use mock::MockPassthru;

use crate::channel::ChannelError;

/// Handle of one logical protocol channel. Always positive.
pub type ChannelId = u32;

/// Passthru API result
pub type PassthruResult<T> = Result<T, PassthruError>;

#[derive(Debug, Clone, thiserror::Error)]
/// Error produced by a passthru device
pub enum PassthruError {
    /// Function called before [PassthruDevice::open]
    #[error("Passthru device is not open")]
    DeviceNotOpen,
    /// Channel ID does not match any active connect
    #[error("Invalid passthru channel {0}")]
    InvalidChannel(ChannelId),
    /// The requested protocol is not supported by this adapter
    #[error("Protocol not supported by adapter")]
    ProtocolNotSupported,
    /// The adapter replied with a non-zero status code
    #[error("Adapter rejected the request (status 0x{0:02X})")]
    DeviceRejected(u8),
    /// The adapter did not reply to a command at all
    #[error("No reply from adapter")]
    NoReply,
    /// Error with the underlying communication channel
    #[error("Passthru channel error")]
    Channel(
        #[from]
        #[source]
        ChannelError,
    ),
}

/// Protocols a passthru channel can be bound to
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, strum_macros::Display)]
#[repr(u8)]
pub enum PassthruProtocol {
    /// SAE J1850 PWM
    J1850Pwm = 1,
    /// SAE J1850 VPW
    J1850Vpw = 2,
    /// ISO9141 K-line
    Iso9141 = 3,
    /// ISO14230 (KWP2000)
    Iso14230 = 4,
    /// Raw CAN
    Can = 5,
    /// ISO15765 (ISO-TP over CAN)
    Iso15765 = 6,
    /// UDS over CAN/ISO-TP (ISO14229)
    Iso14229Uds = 7,
    /// Diagnostics over IP (ISO13400)
    Doip = 8,
}

/// One framed message exchanged over a passthru channel. Immutable once
/// constructed; layers pass it by reference or value copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassthruMessage {
    /// Protocol the message belongs to
    pub protocol: PassthruProtocol,
    /// Adapter-specific transmit flags
    pub tx_flags: u16,
    /// Service payload bytes
    pub data: Vec<u8>,
}

impl PassthruMessage {
    /// Creates a message for the given protocol with default flags
    pub fn new(protocol: PassthruProtocol, data: &[u8]) -> Self {
        Self {
            protocol,
            tx_flags: 0,
            data: data.to_vec(),
        }
    }
}

/// Interface of a J2534-style passthru adapter.
///
/// All hardware-facing failures surface as [PassthruError] values; a read
/// that times out is `Ok(None)`, since an ECU that stays silent is an
/// expected outcome rather than a fault.
pub trait PassthruDevice: Send {
    /// Acquires the underlying transport. Must precede [Self::connect]
    fn open(&mut self) -> PassthruResult<()>;

    /// Releases the transport and tears down all channels. Idempotent.
    fn close(&mut self) -> PassthruResult<()>;

    /// Binds a protocol, returning the new channel's ID. Exactly one
    /// protocol is bound per channel.
    fn connect(&mut self, protocol: PassthruProtocol, flags: u16) -> PassthruResult<ChannelId>;

    /// Unbinds a channel. Idempotent for IDs that were valid once.
    fn disconnect(&mut self, channel_id: ChannelId) -> PassthruResult<()>;

    /// Sends a message on an active channel
    fn send_message(&mut self, channel_id: ChannelId, msg: &PassthruMessage) -> PassthruResult<()>;

    /// Reads the next message from a channel, blocking up to `timeout_ms`.
    /// `Ok(None)` means nothing arrived in time.
    fn read_message(
        &mut self,
        channel_id: ChannelId,
        timeout_ms: u32,
    ) -> PassthruResult<Option<PassthruMessage>>;

    /// True while at least one channel is bound
    fn is_connected(&self) -> bool;
}
