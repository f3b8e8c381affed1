//! ClearDiagnosticInformation (0x14) - clearing all stored trouble codes

use crate::DiagError;

use super::{UdsCommand, UdsSession, policy};

/// groupOfDTC selector meaning "all groups"
pub const GROUP_ALL_DTCS: [u8; 3] = [0xFF, 0xFF, 0xFF];

impl UdsSession {
    /// Clears all stored DTCs via UDS service 0x14 with the all-groups
    /// selector.
    ///
    /// Acceptance follows [policy::is_clear_accepted]: any response, or
    /// even a silent timeout, is success. Only a failure in the adapter or
    /// transport below reports `false`. The disconnected path performs a
    /// demo clear and succeeds without touching the adapter.
    pub fn clear_dtcs(&mut self) -> bool {
        if !self.is_connected() {
            log::warn!("Not connected to vehicle, performing demo clear");
            log::info!("[DEMO] DTCs cleared successfully");
            return true;
        }

        let request = [
            UdsCommand::ClearDiagnosticInformation.into(),
            GROUP_ALL_DTCS[0],
            GROUP_ALL_DTCS[1],
            GROUP_ALL_DTCS[2],
        ];
        log::debug!("Clearing DTCs via UDS 0x14");

        match self.request(&request) {
            Ok(response) => {
                let accepted = policy::is_clear_accepted(Some(&response));
                if accepted {
                    log::info!("DTCs cleared successfully via passthru");
                }
                accepted
            }
            Err(DiagError::EmptyResponse) => {
                let accepted = policy::is_clear_accepted(None);
                log::warn!("DTC clear response unclear, assuming success");
                accepted
            }
            Err(e) => {
                log::error!("DTC clear failed: {e}");
                false
            }
        }
    }
}
