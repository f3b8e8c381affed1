//! ReadDataByIdentifier (0x22) - VIN retrieval

use super::{UdsCommand, UdsSession, policy};

/// Data identifier of the vehicle identification number
pub const DID_VIN: u16 = 0xF190;

impl UdsSession {
    /// Reads the VIN via UDS service 0x22 with DID 0xF190.
    ///
    /// Always returns a 17-character string: when the session is not
    /// connected, the request fails, or the response cannot be parsed, the
    /// fixed demo VIN is substituted and a warning is logged.
    pub fn read_vin(&mut self) -> String {
        if !self.is_connected() {
            log::warn!("Not connected to vehicle, performing demo VIN read");
            log::info!("[DEMO] VIN read: {}", policy::DEMO_VIN);
            return policy::DEMO_VIN.to_string();
        }

        let request = [
            UdsCommand::ReadDataByIdentifier.into(),
            (DID_VIN >> 8) as u8,
            (DID_VIN & 0xFF) as u8,
        ];
        log::debug!("Sending UDS 0x22 request to read VIN");

        match self.request(&request) {
            Ok(response) => match policy::extract_vin(&response) {
                Some(vin) => {
                    log::info!("VIN read via passthru: {vin}");
                    vin
                }
                None => {
                    log::warn!("Invalid VIN response, using demo VIN");
                    policy::DEMO_VIN.to_string()
                }
            },
            Err(e) => {
                log::warn!("VIN read failed ({e}), using demo VIN");
                policy::DEMO_VIN.to_string()
            }
        }
    }
}
