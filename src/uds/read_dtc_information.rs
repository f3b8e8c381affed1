//! ReadDTCInformation (0x19) - scanning stored trouble codes

use crate::dtc::{Dtc, parse_dtc_records};

use super::{UdsCommand, UdsSession, policy};

/// ReadDTCInformation sub-function issued by the scan: reportNumberOfDTC /
/// report DTCs by status mask variant used by the deployed tooling
pub const SUBFN_REPORT_DTCS: u8 = 0x01;

impl UdsSession {
    /// Scans stored DTCs via UDS service 0x19 sub-function 0x01.
    ///
    /// Record order mirrors the response and duplicates are kept. Never
    /// returns an empty list:
    /// * not connected - the three-code offline demo set
    /// * connected but no/unparseable response - the single fallback DTC
    pub fn scan_dtcs(&mut self) -> Vec<Dtc> {
        if !self.is_connected() {
            log::warn!("Not connected to vehicle, performing demo scan");
            let dtcs = policy::demo_dtcs_offline();
            log::info!("[DEMO] Found {} DTCs", dtcs.len());
            return dtcs;
        }

        let request = [UdsCommand::ReadDtcInformation.into(), SUBFN_REPORT_DTCS];
        log::debug!("Scanning DTCs via UDS 0x19");

        match self.request(&request) {
            Ok(response) if policy::is_dtc_response(&response) => {
                // Skip response byte + sub-function echo; the rest is
                // 4-byte record groups
                let dtcs = parse_dtc_records(&response[2..]);
                if dtcs.is_empty() {
                    log::warn!("DTC response contained no records, using fallback");
                    vec![policy::fallback_dtc()]
                } else {
                    log::info!("Found {} DTCs via passthru", dtcs.len());
                    dtcs
                }
            }
            Ok(_) => {
                log::warn!("Invalid DTC response, using fallback");
                vec![policy::fallback_dtc()]
            }
            Err(e) => {
                log::warn!("DTC scan failed ({e}), using fallback");
                vec![policy::fallback_dtc()]
            }
        }
    }
}
