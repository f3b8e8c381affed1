//! Brand-level diagnostic session orchestration
//!
//! A [DiagnosticSession] wraps one [DiagEngine] and accumulates everything
//! the operator sees into [DiagnosticResults]. Volkswagen is the only brand
//! with a real UDS implementation; every other brand is served canned data
//! by [MockEngine], with the substitution recorded in `is_mock`.

use crate::{
    dtc::{Dtc, DtcSeverity},
    passthru::PassthruDevice,
    uds::{UdsSession, UdsSessionOptions},
};

/// Accumulated outcome of one diagnostic session, shaped for display
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DiagnosticResults {
    /// Vehicle identification number, once read
    pub vin: Option<String>,
    /// Brand the session was started for
    pub brand: String,
    /// Trouble codes from the most recent scan
    pub dtcs: Vec<Dtc>,
    /// True when the session runs on canned data rather than a vehicle
    pub is_mock: bool,
    /// Human readable outcome of the last operation
    pub status_message: String,
}

/// The operations a diagnostic backend provides to the session.
///
/// Engines report outcomes, not errors: every degrade-to-demo decision has
/// already happened below this seam, so the session only records results.
pub trait DiagEngine: Send {
    /// Establishes the vehicle link. `false` means the session will run in
    /// its degraded mode.
    fn connect(&mut self) -> bool;
    /// Drops the vehicle link
    fn disconnect(&mut self) -> bool;
    /// Reads the VIN; `None` when the engine has nothing to report
    fn read_vin(&mut self) -> Option<String>;
    /// Scans stored trouble codes
    fn scan_dtcs(&mut self) -> Vec<Dtc>;
    /// Clears stored trouble codes
    fn clear_dtcs(&mut self) -> bool;
}

impl DiagEngine for UdsSession {
    fn connect(&mut self) -> bool {
        match UdsSession::connect(self) {
            Ok(()) => true,
            Err(e) => {
                log::error!("Connection failed: {e}");
                false
            }
        }
    }

    fn disconnect(&mut self) -> bool {
        match UdsSession::disconnect(self) {
            Ok(()) => true,
            Err(e) => {
                log::error!("Disconnection failed: {e}");
                false
            }
        }
    }

    fn read_vin(&mut self) -> Option<String> {
        Some(UdsSession::read_vin(self))
    }

    fn scan_dtcs(&mut self) -> Vec<Dtc> {
        UdsSession::scan_dtcs(self)
    }

    fn clear_dtcs(&mut self) -> bool {
        UdsSession::clear_dtcs(self)
    }
}

/// Canned-data engine for brands without a real implementation
#[derive(Debug)]
pub struct MockEngine {
    brand: String,
}

impl MockEngine {
    /// Creates a mock engine for the given brand
    pub fn new(brand: &str) -> Self {
        log::info!("Mock diagnostic engine initialized for {brand}");
        Self {
            brand: brand.to_string(),
        }
    }
}

impl DiagEngine for MockEngine {
    fn connect(&mut self) -> bool {
        true
    }

    fn disconnect(&mut self) -> bool {
        true
    }

    fn read_vin(&mut self) -> Option<String> {
        let vin = match self.brand.as_str() {
            "Toyota" => "JTDKN3AU7E0123456".to_string(),
            "Honda" => "JHGCV4A47DA123456".to_string(),
            "Ford" => "1GTGG6B30F1272520".to_string(),
            "Chevrolet" => "1G1FR52K0LF123456".to_string(),
            "Hyundai" => "KMHLU4A47CU123456".to_string(),
            other => format!("MOCK{:<8}123456789", other.to_uppercase()),
        };
        log::debug!("[{}] Mock VIN: {vin}", self.brand);
        Some(vin)
    }

    fn scan_dtcs(&mut self) -> Vec<Dtc> {
        let dtcs = match self.brand.as_str() {
            "Toyota" => vec![Dtc::new(
                "P0171",
                DtcSeverity::Medium,
                "System Too Lean (Bank 1)",
            )],
            "Honda" => vec![Dtc::new(
                "P0420",
                DtcSeverity::Medium,
                "Catalyst Efficiency Below Threshold",
            )],
            "Ford" => vec![Dtc::new(
                "P0500",
                DtcSeverity::Low,
                "Vehicle Speed Sensor Malfunction",
            )],
            _ => vec![Dtc::new("P0000", DtcSeverity::Low, "No DTCs Found")],
        };
        log::debug!("[{}] Mock DTC scan returned {} codes", self.brand, dtcs.len());
        dtcs
    }

    fn clear_dtcs(&mut self) -> bool {
        log::debug!("[{}] Mock DTC clear", self.brand);
        true
    }
}

/// One diagnostic session for one vehicle brand
pub struct DiagnosticSession {
    engine: Box<dyn DiagEngine>,
    /// Accumulated results, updated by every operation
    pub results: DiagnosticResults,
}

impl std::fmt::Debug for DiagnosticSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiagnosticSession")
            .field("results", &self.results)
            .finish()
    }
}

impl DiagnosticSession {
    /// Starts a session for `brand`. Volkswagen (case-insensitive) gets a
    /// real UDS engine over the supplied passthru adapter; every other
    /// brand gets the mock engine and the adapter is dropped unused.
    pub fn new(brand: &str, passthru: Box<dyn PassthruDevice>) -> Self {
        let engine: Box<dyn DiagEngine> = if brand.eq_ignore_ascii_case("volkswagen") {
            Box::new(UdsSession::new(passthru, UdsSessionOptions::default()))
        } else {
            Box::new(MockEngine::new(brand))
        };
        Self::with_engine(brand, engine, !brand.eq_ignore_ascii_case("volkswagen"))
    }

    /// Starts a session over a caller-provided engine
    pub fn with_engine(brand: &str, engine: Box<dyn DiagEngine>, is_mock: bool) -> Self {
        log::info!("Diagnostic session started for {brand}");
        Self {
            engine,
            results: DiagnosticResults {
                brand: brand.to_string(),
                is_mock,
                ..DiagnosticResults::default()
            },
        }
    }

    /// Connects the engine to the vehicle
    pub fn connect(&mut self) -> bool {
        self.engine.connect()
    }

    /// Disconnects the engine from the vehicle
    pub fn disconnect(&mut self) -> bool {
        self.engine.disconnect()
    }

    /// Reads the VIN and records it in the results
    pub fn read_vin(&mut self) -> Option<String> {
        self.results.vin = self.engine.read_vin();
        match &self.results.vin {
            Some(vin) => {
                self.results.status_message = format!("VIN read successfully: {vin}");
            }
            None => {
                self.results.status_message = "VIN read failed".to_string();
                log::error!("{}", self.results.status_message);
            }
        }
        self.results.vin.clone()
    }

    /// Scans for DTCs and records them in the results
    pub fn scan_dtcs(&mut self) -> Vec<Dtc> {
        self.results.dtcs = self.engine.scan_dtcs();
        self.results.status_message =
            format!("DTC scan completed: {} codes found", self.results.dtcs.len());
        log::info!("{}", self.results.status_message);
        self.results.dtcs.clone()
    }

    /// Clears all DTCs. On success the recorded DTC list is emptied, even
    /// if a later scan would still report codes.
    pub fn clear_dtcs(&mut self) -> bool {
        let success = self.engine.clear_dtcs();
        if success {
            self.results.dtcs.clear();
            self.results.status_message = "DTCs cleared successfully".to_string();
        } else {
            self.results.status_message = "DTC clear failed".to_string();
        }
        log::info!("{}", self.results.status_message);
        success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passthru::MockPassthru;

    #[test]
    fn brand_dispatch_marks_mock_sessions() {
        let session = DiagnosticSession::new("Toyota", Box::new(MockPassthru::new()));
        assert!(session.results.is_mock);

        let session = DiagnosticSession::new("Volkswagen", Box::new(MockPassthru::new()));
        assert!(!session.results.is_mock);
        let session = DiagnosticSession::new("VOLKSWAGEN", Box::new(MockPassthru::new()));
        assert!(!session.results.is_mock);
    }

    #[test]
    fn mock_brand_tables() {
        let mut engine = MockEngine::new("Toyota");
        assert_eq!(engine.read_vin().as_deref(), Some("JTDKN3AU7E0123456"));
        let dtcs = engine.scan_dtcs();
        assert_eq!(dtcs.len(), 1);
        assert_eq!(dtcs[0].code, "P0171");

        let mut engine = MockEngine::new("Fiat");
        assert_eq!(engine.scan_dtcs()[0].code, "P0000");
        assert!(engine.read_vin().is_some());
        assert!(engine.clear_dtcs());
    }

    #[test]
    fn clear_empties_recorded_dtcs() {
        let mut session = DiagnosticSession::new("Honda", Box::new(MockPassthru::new()));
        assert!(session.connect());
        assert!(!session.scan_dtcs().is_empty());
        assert!(!session.results.dtcs.is_empty());
        assert!(session.clear_dtcs());
        assert!(session.results.dtcs.is_empty());
        assert_eq!(session.results.status_message, "DTCs cleared successfully");
    }

    #[test]
    fn operations_update_the_status_message() {
        let mut session = DiagnosticSession::new("Ford", Box::new(MockPassthru::new()));
        session.read_vin();
        assert!(session.results.status_message.starts_with("VIN read successfully"));
        session.scan_dtcs();
        assert_eq!(
            session.results.status_message,
            "DTC scan completed: 1 codes found"
        );
    }
}
