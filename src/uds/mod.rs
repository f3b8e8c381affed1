//! Module for UDS (Unified diagnostic services - ISO14229) sessions over a
//! passthru channel
//!
//! The session implements the three services the workshop front end drives:
//! VIN read, DTC scan and DTC clear. Each operation carries a documented
//! degrade-to-demo behaviour (see [policy]) so a session against a bench
//! emulator, or no vehicle at all, still produces displayable results.

mod clear_diagnostic_information;
mod read_data_by_identifier;
mod read_dtc_information;
pub mod policy;

pub use clear_diagnostic_information::GROUP_ALL_DTCS;
pub use read_data_by_identifier::DID_VIN;
pub use read_dtc_information::SUBFN_REPORT_DTCS;

use crate::{
    DiagError, DiagServerResult,
    passthru::{ChannelId, PassthruDevice, PassthruMessage, PassthruProtocol},
};

/// UDS Command Service IDs issued by this crate
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum UdsCommand {
    /// Diagnostic session control
    DiagnosticSessionControl,
    /// ECU reset
    EcuReset,
    /// Clearing stored diagnostic trouble codes
    ClearDiagnosticInformation,
    /// Reading and querying diagnostic trouble codes stored on the ECU
    ReadDtcInformation,
    /// Reading data (EG: the VIN) by 16-bit identifier
    ReadDataByIdentifier,
    /// Tester present keep-alive
    TesterPresent,
    /// Any other service ID
    Other(u8),
}

impl From<u8> for UdsCommand {
    fn from(sid: u8) -> Self {
        match sid {
            0x10 => UdsCommand::DiagnosticSessionControl,
            0x11 => UdsCommand::EcuReset,
            0x14 => UdsCommand::ClearDiagnosticInformation,
            0x19 => UdsCommand::ReadDtcInformation,
            0x22 => UdsCommand::ReadDataByIdentifier,
            0x3E => UdsCommand::TesterPresent,
            x => UdsCommand::Other(x),
        }
    }
}

impl From<UdsCommand> for u8 {
    fn from(cmd: UdsCommand) -> Self {
        match cmd {
            UdsCommand::DiagnosticSessionControl => 0x10,
            UdsCommand::EcuReset => 0x11,
            UdsCommand::ClearDiagnosticInformation => 0x14,
            UdsCommand::ReadDtcInformation => 0x19,
            UdsCommand::ReadDataByIdentifier => 0x22,
            UdsCommand::TesterPresent => 0x3E,
            UdsCommand::Other(x) => x,
        }
    }
}

#[derive(Debug, Copy, Clone)]
/// UDS session options
pub struct UdsSessionOptions {
    /// Read timeout for ECU responses in ms
    pub read_timeout_ms: u32,
    /// Adapter connect flags
    pub connect_flags: u16,
}

impl Default for UdsSessionOptions {
    fn default() -> Self {
        Self {
            read_timeout_ms: 1000,
            connect_flags: 0,
        }
    }
}

/// UDS diagnostic session over a passthru channel.
///
/// State machine is two states only: disconnected and connected.
/// [UdsSession::connect] either fully succeeds (adapter open plus a bound
/// UDS channel) or leaves the session disconnected; there is no
/// half-connected state.
pub struct UdsSession {
    passthru: Box<dyn PassthruDevice>,
    options: UdsSessionOptions,
    channel_id: Option<ChannelId>,
}

impl std::fmt::Debug for UdsSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UdsSession")
            .field("channel_id", &self.channel_id)
            .field("options", &self.options)
            .finish()
    }
}

impl UdsSession {
    /// Creates a session over the given passthru device
    pub fn new(passthru: Box<dyn PassthruDevice>, options: UdsSessionOptions) -> Self {
        log::info!("UDS diagnostic session initialized (ISO14229 via passthru)");
        Self {
            passthru,
            options,
            channel_id: None,
        }
    }

    /// Opens the adapter and binds a UDS channel. On any failure the
    /// session stays disconnected and the error is returned.
    pub fn connect(&mut self) -> DiagServerResult<()> {
        if self.channel_id.is_some() {
            return Ok(());
        }
        self.passthru.open()?;
        let channel_id = self
            .passthru
            .connect(PassthruProtocol::Iso14229Uds, self.options.connect_flags)?;
        self.channel_id = Some(channel_id);
        log::info!("Connected to vehicle via passthru (channel {channel_id})");
        Ok(())
    }

    /// Releases the channel and the adapter, in that order. Idempotent.
    pub fn disconnect(&mut self) -> DiagServerResult<()> {
        if let Some(channel_id) = self.channel_id.take() {
            self.passthru.disconnect(channel_id)?;
            self.passthru.close()?;
            log::info!("Disconnected from vehicle");
        }
        Ok(())
    }

    /// True while a UDS channel is bound
    pub fn is_connected(&self) -> bool {
        self.channel_id.is_some()
    }

    /// One request/response exchange on the bound channel
    pub(crate) fn request(&mut self, payload: &[u8]) -> DiagServerResult<Vec<u8>> {
        let channel_id = self.channel_id.ok_or(DiagError::NotConnected)?;
        let msg = PassthruMessage::new(PassthruProtocol::Iso14229Uds, payload);
        self.passthru.send_message(channel_id, &msg)?;
        match self.passthru.read_message(channel_id, self.options.read_timeout_ms)? {
            Some(response) => Ok(response.data),
            None => Err(DiagError::EmptyResponse),
        }
    }
}
