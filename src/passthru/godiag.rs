//! GoDiag GD101 passthru adapter over its serial command framing
//!
//! Every host->adapter exchange is one command frame followed by one status
//! reply. Frame layout:
//!
//! * `00 01` / `00 02`        - adapter init / adapter shutdown
//! * `01 <proto> <flags:2>`   - connect channel
//! * `02 <chan>`              - disconnect channel
//! * `03 <chan> <len:2> <data>` - transmit message
//! * `04 <chan>`              - poll received message
//!
//! Replies start with a status byte (0x00 = success); message polls append
//! `<len:2> <data>` after it.

use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use crate::channel::{ChannelError, Transport};

use super::{
    ChannelId, PassthruDevice, PassthruError, PassthruMessage, PassthruProtocol, PassthruResult,
};

const CMD_INIT: [u8; 2] = [0x00, 0x01];
const CMD_SHUTDOWN: [u8; 2] = [0x00, 0x02];
const CMD_CONNECT: u8 = 0x01;
const CMD_DISCONNECT: u8 = 0x02;
const CMD_SEND: u8 = 0x03;
const CMD_POLL: u8 = 0x04;

const STATUS_OK: u8 = 0x00;

/// Settle time the adapter needs after the init command
const INIT_SETTLE: Duration = Duration::from_millis(500);

/// Per-poll read timeout while waiting for an ECU response
const POLL_READ_TIMEOUT_MS: u32 = 100;

/// GoDiag GD101 passthru device
pub struct GodiagPassthru {
    transport: Box<dyn Transport>,
    command_timeout_ms: u32,
    is_open: bool,
    channels: HashMap<ChannelId, PassthruProtocol>,
    next_channel_id: ChannelId,
}

impl std::fmt::Debug for GodiagPassthru {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GodiagPassthru")
            .field("open", &self.is_open)
            .field("channels", &self.channels)
            .finish()
    }
}

/// J2534 protocol -> GoDiag protocol selector byte
fn godiag_protocol_id(protocol: PassthruProtocol) -> Option<u8> {
    match protocol {
        PassthruProtocol::Iso14229Uds => Some(0x14),
        PassthruProtocol::Can => Some(0x05),
        PassthruProtocol::Iso15765 => Some(0x06),
        PassthruProtocol::Iso14230 => Some(0x04),
        _ => None,
    }
}

impl GodiagPassthru {
    /// Creates a passthru device over the given transport (normally a
    /// [crate::hardware::serial::SerialTransport] at 115200 baud)
    pub fn new(transport: Box<dyn Transport>, command_timeout_ms: u32) -> Self {
        Self {
            transport,
            command_timeout_ms,
            is_open: false,
            channels: HashMap::new(),
            next_channel_id: 1,
        }
    }

    /// Creates a passthru device for a transport target, building the
    /// concrete transport via [crate::hardware::create_transport]
    pub fn for_target(
        target: &crate::channel::TransportTarget,
        command_timeout_ms: u32,
    ) -> crate::channel::ChannelResult<Self> {
        Ok(Self::new(
            crate::hardware::create_transport(target)?,
            command_timeout_ms,
        ))
    }

    /// One command/reply exchange with the adapter
    fn exchange(&mut self, cmd: &[u8], timeout_ms: u32) -> PassthruResult<Vec<u8>> {
        let reply = match self.transport.send_recv_bytes(cmd, timeout_ms) {
            Ok(r) => r,
            Err(ChannelError::ReadTimeout) => return Err(PassthruError::NoReply),
            Err(e) => return Err(e.into()),
        };
        if reply.is_empty() {
            return Err(PassthruError::NoReply);
        }
        Ok(reply)
    }

    /// Command exchange where the only interesting outcome is the status byte
    fn exchange_status(&mut self, cmd: &[u8]) -> PassthruResult<()> {
        let reply = self.exchange(cmd, self.command_timeout_ms)?;
        match reply[0] {
            STATUS_OK => Ok(()),
            code => Err(PassthruError::DeviceRejected(code)),
        }
    }

    fn check_channel(&self, channel_id: ChannelId) -> PassthruResult<PassthruProtocol> {
        self.channels
            .get(&channel_id)
            .copied()
            .ok_or(PassthruError::InvalidChannel(channel_id))
    }
}

impl PassthruDevice for GodiagPassthru {
    fn open(&mut self) -> PassthruResult<()> {
        if self.is_open {
            return Ok(());
        }
        self.transport.open()?;
        self.transport.send_bytes(&CMD_INIT)?;
        // The GD101 replies nothing to init; it just needs settle time
        std::thread::sleep(INIT_SETTLE);
        self.is_open = true;
        log::info!("GoDiag GD101 passthru opened");
        Ok(())
    }

    fn close(&mut self) -> PassthruResult<()> {
        if !self.is_open {
            return Ok(());
        }
        // Best effort shutdown; the adapter may already be unplugged
        if let Err(e) = self.transport.send_bytes(&CMD_SHUTDOWN) {
            log::warn!("GD101 shutdown command failed: {e}");
        }
        self.transport.close()?;
        self.channels.clear();
        self.is_open = false;
        log::info!("GoDiag GD101 passthru closed");
        Ok(())
    }

    fn connect(&mut self, protocol: PassthruProtocol, flags: u16) -> PassthruResult<ChannelId> {
        if !self.is_open {
            return Err(PassthruError::DeviceNotOpen);
        }
        let proto_id = godiag_protocol_id(protocol).ok_or(PassthruError::ProtocolNotSupported)?;
        let cmd = [CMD_CONNECT, proto_id, (flags >> 8) as u8, (flags & 0xFF) as u8];
        self.exchange_status(&cmd)?;

        let channel_id = self.next_channel_id;
        self.next_channel_id += 1;
        self.channels.insert(channel_id, protocol);
        log::info!("Connected to {protocol} on channel {channel_id}");
        Ok(channel_id)
    }

    fn disconnect(&mut self, channel_id: ChannelId) -> PassthruResult<()> {
        if !self.channels.contains_key(&channel_id) {
            return Ok(());
        }
        self.exchange_status(&[CMD_DISCONNECT, channel_id as u8])?;
        self.channels.remove(&channel_id);
        log::debug!("Disconnected channel {channel_id}");
        Ok(())
    }

    fn send_message(&mut self, channel_id: ChannelId, msg: &PassthruMessage) -> PassthruResult<()> {
        self.check_channel(channel_id)?;
        let len = msg.data.len();
        let mut cmd = Vec::with_capacity(4 + len);
        cmd.push(CMD_SEND);
        cmd.push(channel_id as u8);
        cmd.push((len >> 8) as u8);
        cmd.push((len & 0xFF) as u8);
        cmd.extend_from_slice(&msg.data);
        self.exchange_status(&cmd)?;
        log::debug!("Sent {len} bytes on channel {channel_id}");
        Ok(())
    }

    fn read_message(
        &mut self,
        channel_id: ChannelId,
        timeout_ms: u32,
    ) -> PassthruResult<Option<PassthruMessage>> {
        let protocol = self.check_channel(channel_id)?;
        let start = Instant::now();
        loop {
            match self.exchange(&[CMD_POLL, channel_id as u8], POLL_READ_TIMEOUT_MS) {
                Ok(reply) if reply.len() > 3 => {
                    let data_len = ((reply[1] as usize) << 8) | reply[2] as usize;
                    let end = (3 + data_len).min(reply.len());
                    let data = &reply[3..end];
                    log::debug!("Read {} bytes on channel {channel_id}", data.len());
                    return Ok(Some(PassthruMessage::new(protocol, data)));
                }
                // Short reply or no reply yet: keep polling until deadline
                Ok(_) | Err(PassthruError::NoReply) => {}
                Err(e) => return Err(e),
            }
            if start.elapsed().as_millis() as u32 >= timeout_ms {
                return Ok(None);
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    fn is_connected(&self) -> bool {
        !self.channels.is_empty()
    }
}
