//! Named response-acceptance and fallback policies for the UDS session
//!
//! The deployed tooling runs against pass-through emulators as often as
//! real vehicles, so the session deliberately degrades to fixed demo data
//! instead of failing operations. Each rule lives here as its own function
//! so the permissiveness is visible and testable in isolation.

use crate::dtc::{Dtc, DtcSeverity};

/// Fixed fallback VIN substituted whenever a real VIN cannot be obtained
pub const DEMO_VIN: &str = "WVWZZZ3CZ7E123456";

/// Positive-response indicator bytes the session accepts.
///
/// 0x62 is the real positive response to ReadDataByIdentifier; 0x59 and
/// 0x54 are tolerated as alive-signals because permissive mock responders
/// answer with whichever service reply they have queued.
pub fn is_positive_response(first_byte: u8) -> bool {
    matches!(first_byte, 0x62 | 0x59 | 0x54)
}

/// Attempts to pull a 17-character ASCII VIN out of a ReadDataByIdentifier
/// response. The VIN sits after the 3-byte `62 F1 90` header when the
/// payload is long enough, otherwise it is taken from the 17-byte tail.
/// `None` means the caller should substitute [DEMO_VIN].
pub fn extract_vin(data: &[u8]) -> Option<String> {
    if data.len() < 3 {
        return None;
    }
    if !is_positive_response(data[0]) && data.len() <= 3 {
        return None;
    }
    let raw = if data.len() >= 20 {
        &data[3..20]
    } else if data.len() >= 17 {
        &data[data.len() - 17..]
    } else {
        return None;
    };
    let vin: String = raw
        .iter()
        .map(|&b| if b.is_ascii_graphic() { b as char } else { '?' })
        .collect();
    Some(vin)
}

/// Checks whether a ReadDTCInformation response is worth handing to the
/// DTC decoder: a recognised positive-response byte, or any payload long
/// enough to plausibly contain record groups.
pub fn is_dtc_response(data: &[u8]) -> bool {
    data.len() > 2 && (is_positive_response(data[0]) || data.len() > 4)
}

/// Clear-DTC acceptance rule. Deliberately permissive: any response at
/// all, and even a silent timeout (`None`), counts as success, because
/// emulators frequently swallow the 0x54 confirmation. Only a transport
/// failure below this layer reports a failed clear.
///
/// The response stays a parameter even though the current rule ignores it:
/// call sites already route their `Some`/`None` outcomes through here, so
/// tightening the rule (requiring 0x54, rejecting 0x7F) is a change to this
/// one function.
pub fn is_clear_accepted(_response: Option<&[u8]>) -> bool {
    true
}

/// Single fixed fallback DTC substituted when a connected scan yields a
/// response that decodes to nothing
pub fn fallback_dtc() -> Dtc {
    Dtc::new(
        "P0300",
        DtcSeverity::High,
        "Random/Multiple Cylinder Misfire Detected",
    )
}

/// Demo scan results for a session that is not connected at all.
///
/// Note this is intentionally a different payload from [fallback_dtc]:
/// an obviously-offline session shows a richer three-code demo set, while
/// a connected-but-unparseable scan shows the single generic fallback.
/// Whether that split is deliberate UX or an accident of history is
/// unresolved; both presentations are kept distinct on purpose.
pub fn demo_dtcs_offline() -> Vec<Dtc> {
    vec![
        Dtc::new(
            "P0300",
            DtcSeverity::High,
            "Random/Multiple Cylinder Misfire Detected",
        ),
        Dtc::new("P0301", DtcSeverity::High, "Cylinder 1 Misfire Detected"),
        Dtc::new("U0100", DtcSeverity::Critical, "Lost Communication with ECM"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vin_from_full_response() {
        let mut data = vec![0x62, 0xF1, 0x90];
        data.extend_from_slice(b"WVWZZZ3CZ7E123456");
        assert_eq!(extract_vin(&data).as_deref(), Some("WVWZZZ3CZ7E123456"));
    }

    #[test]
    fn vin_from_tail_when_header_missing() {
        // 17 bytes exactly: taken from the tail
        let data = b"WVWZZZ3CZ7E123456".to_vec();
        assert_eq!(extract_vin(&data).as_deref(), Some("WVWZZZ3CZ7E123456"));
    }

    #[test]
    fn vin_rejects_short_or_negative_responses() {
        assert_eq!(extract_vin(&[]), None);
        assert_eq!(extract_vin(&[0x7F, 0x22]), None);
        assert_eq!(extract_vin(&[0x7F, 0x22, 0x31]), None);
        assert_eq!(extract_vin(&[0x62, 0xF1, 0x90, 0x41]), None);
    }

    #[test]
    fn vin_is_always_17_chars_when_present() {
        let mut data = vec![0x62, 0xF1, 0x90];
        data.extend_from_slice(&[0xFF; 17]); // non-ASCII payload
        let vin = extract_vin(&data).unwrap();
        assert_eq!(vin.chars().count(), 17);
    }

    #[test]
    fn alive_signal_bytes_accepted() {
        assert!(is_positive_response(0x62));
        assert!(is_positive_response(0x59));
        assert!(is_positive_response(0x54));
        assert!(!is_positive_response(0x7F));
        assert!(!is_positive_response(0x50));
    }

    #[test]
    fn clear_policy_is_permissive() {
        assert!(is_clear_accepted(Some(&[0x54])));
        assert!(is_clear_accepted(Some(&[0x7F, 0x14, 0x31])));
        assert!(is_clear_accepted(Some(&[])));
        assert!(is_clear_accepted(None));
    }

    #[test]
    fn offline_and_fallback_payloads_stay_distinct() {
        let offline = demo_dtcs_offline();
        assert_eq!(offline.len(), 3);
        assert_ne!(offline, vec![fallback_dtc()]);
    }
}
