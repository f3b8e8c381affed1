#![warn(
    missing_docs,
    missing_debug_implementations,
    trivial_numeric_casts,
    unused_import_braces,
    unused_qualifications,
    clippy::uninlined_format_args
)]

//! A crate which provides a UDS (ISO14229) diagnostic session layer over
//! J2534-style passthru adapters, together with discovery and connection
//! management for GoDiag GT100 VCI hardware over USB, serial and DOIP
//! (ISO13400) transports.
//!
//! ## Protocol support
//!
//! ### Unified diagnostic services (UDS)
//! The session layer implements the three services a workshop scan tool
//! exercises most:
//! * ReadDataByIdentifier (0x22) for the vehicle identification number
//! * ReadDTCInformation (0x19) for stored trouble codes
//! * ClearDiagnosticInformation (0x14)
//!
//! When no vehicle is on the other end of the adapter (bench setups and
//! pass-through emulators are common in this space), each operation degrades
//! to documented demo data rather than failing. See [uds::policy] for the
//! exact rules.
//!
//! ## Hardware support (VCIs)
//!
//! * GoDiag GD101 passthru adapters over a serial command framing
//! * GoDiag GT100 PLUS GPT devices over USB, DOIP/Ethernet and generic
//!   serial, including scan-time discovery and background voltage/current
//!   telemetry

pub mod channel;
pub mod doip;
pub mod dtc;
pub mod hardware;
pub mod passthru;
pub mod session;
pub mod uds;

use channel::ChannelError;
use hardware::HardwareError;
use passthru::PassthruError;

/// Diagnostic session result
pub type DiagServerResult<T> = Result<T, DiagError>;

#[derive(Clone, Debug, thiserror::Error)]
/// Diagnostic session error
pub enum DiagError {
    /// Operation requires a connected session
    #[error("Not connected to the vehicle")]
    NotConnected,
    /// ECU did not respond within the read timeout
    #[error("ECU did not respond to the request")]
    EmptyResponse,
    /// ECU responded, but the payload was too short to interpret
    #[error("ECU response size was not the correct length")]
    InvalidResponseLength,
    /// Error from the passthru adapter
    #[error("Passthru device error")]
    Passthru(
        #[from]
        #[source]
        PassthruError,
    ),
    /// Error with the underlying communication channel
    #[error("Hardware channel error")]
    Channel(
        #[from]
        #[source]
        ChannelError,
    ),
    /// Device hardware error
    #[error("Hardware error")]
    Hardware(
        #[from]
        #[source]
        HardwareError,
    ),
}
