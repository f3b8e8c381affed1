//! Module for diagnostic trouble code (DTC) data and decoding
//!
//! The decoder is a pure transform over the raw byte groups returned by UDS
//! ReadDTCInformation (0x19). Fallback/demo substitution on empty results is
//! an orchestration decision, not something the decoder does itself.

use bitflags::bitflags;

/// Severity classification of a stored DTC, derived from its status byte
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, strum_macros::Display)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DtcSeverity {
    /// Pending or intermittent fault
    Low,
    /// Stored fault, not confirmed this drive cycle
    Medium,
    /// Confirmed fault
    High,
    /// Loss of module communication or similar
    Critical,
}

bitflags! {
    /// UDS DTC status byte (ISO14229 D.2), as far as this crate interprets it
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct DtcStatusByte: u8 {
        /// testFailed
        const TEST_FAILED = 0x01;
        /// confirmedDTC
        const CONFIRMED = 0x08;
        /// testNotCompletedSinceLastClear (pending/intermittent indication)
        const PENDING = 0x40;
        /// warningIndicatorRequested (MIL)
        const MIL_ON = 0x80;
    }
}

impl DtcStatusByte {
    /// Maps the status byte onto the coarse severity bucket the UI displays.
    /// Confirmed wins over pending; anything else is Medium.
    pub fn severity(self) -> DtcSeverity {
        if self.contains(DtcStatusByte::CONFIRMED) {
            DtcSeverity::High
        } else if self.contains(DtcStatusByte::PENDING) {
            DtcSeverity::Low
        } else {
            DtcSeverity::Medium
        }
    }
}

/// Diagnostic trouble code storage struct
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Dtc {
    /// Displayable code (system letter + hex digits, EG: 'P0300')
    pub code: String,
    /// Severity bucket from the status byte
    pub severity: DtcSeverity,
    /// Human readable description
    pub description: String,
}

impl Dtc {
    /// Creates a DTC record
    pub fn new(code: &str, severity: DtcSeverity, description: &str) -> Self {
        Self {
            code: code.to_string(),
            severity,
            description: description.to_string(),
        }
    }
}

const SYSTEM_LETTERS: [char; 4] = ['P', 'C', 'B', 'U'];

/// Decodes one 3-byte DTC identifier into its display string.
///
/// Letter from the top 2 bits of byte 0, then the low nibble of byte 0 as
/// one hex digit, then bytes 1-2 as four hex digits. Note that when bytes
/// 1-2 are zero this yields a 6-character code (EG: 'P30000') rather than
/// the usual 5-character form; the digit arrangement is kept exactly as the
/// deployed tooling emits it, since downstream consumers match on it.
pub fn format_dtc_code(id: &[u8; 3]) -> String {
    let letter = SYSTEM_LETTERS[((id[0] >> 6) & 0x03) as usize];
    format!("{}{:X}{:02X}{:02X}", letter, id[0] & 0x0F, id[1], id[2])
}

/// Parses the DTC record section of a ReadDTCInformation response.
///
/// Input is consumed in 4-byte groups (3 identifier bytes + 1 status byte)
/// for as long as at least 4 bytes remain; trailing partial groups are
/// ignored. Output order mirrors response order and duplicates are kept
/// as-is. An empty or malformed buffer decodes to an empty list.
pub fn parse_dtc_records(payload: &[u8]) -> Vec<Dtc> {
    let mut result = Vec::with_capacity(payload.len() / 4);
    for group in payload.chunks_exact(4) {
        let id: [u8; 3] = [group[0], group[1], group[2]];
        let status = DtcStatusByte::from_bits_truncate(group[3]);
        result.push(Dtc {
            code: format_dtc_code(&id),
            severity: status.severity(),
            description: "Vehicle DTC".to_string(),
        });
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_is_deterministic() {
        let input = [0x03, 0x00, 0x00, 0x08];
        let a = parse_dtc_records(&input);
        let b = parse_dtc_records(&input);
        assert_eq!(a, b);
        assert_eq!(a.len(), 1);
        // Low nibble of byte 0 contributes its own digit, so zeroed
        // trailing bytes produce the 6-char form
        assert_eq!(a[0].code, "P30000");
        assert_eq!(a[0].severity, DtcSeverity::High);
        assert_eq!(a[0].description, "Vehicle DTC");
    }

    #[test]
    fn letter_follows_top_bits() {
        assert_eq!(format_dtc_code(&[0x03, 0x00, 0x00]), "P30000");
        assert_eq!(format_dtc_code(&[0x43, 0x12, 0x34]), "C31234");
        assert_eq!(format_dtc_code(&[0x83, 0xAB, 0xCD]), "B3ABCD");
        assert_eq!(format_dtc_code(&[0xC1, 0x00, 0x01]), "U10001");
    }

    #[test]
    fn severity_buckets() {
        assert_eq!(DtcStatusByte::from_bits_truncate(0x08).severity(), DtcSeverity::High);
        assert_eq!(DtcStatusByte::from_bits_truncate(0x48).severity(), DtcSeverity::High);
        assert_eq!(DtcStatusByte::from_bits_truncate(0x40).severity(), DtcSeverity::Low);
        assert_eq!(DtcStatusByte::from_bits_truncate(0x00).severity(), DtcSeverity::Medium);
        assert_eq!(DtcStatusByte::from_bits_truncate(0x81).severity(), DtcSeverity::Medium);
    }

    #[test]
    fn multiple_groups_keep_response_order() {
        let payload = [
            0x03, 0x00, 0x00, 0x08, // P30000 High
            0x03, 0x01, 0x00, 0x40, // P30100 Low
            0xC1, 0x00, 0x00, 0x00, // U10000 Medium
        ];
        let dtcs = parse_dtc_records(&payload);
        assert_eq!(dtcs.len(), 3);
        assert_eq!(dtcs[0].code, "P30000");
        assert_eq!(dtcs[1].code, "P30100");
        assert_eq!(dtcs[1].severity, DtcSeverity::Low);
        assert_eq!(dtcs[2].code, "U10000");
        assert_eq!(dtcs[2].severity, DtcSeverity::Medium);
    }

    #[test]
    fn trailing_partial_group_ignored() {
        let payload = [0x03, 0x00, 0x00, 0x08, 0x01, 0x02];
        assert_eq!(parse_dtc_records(&payload).len(), 1);
    }

    #[test]
    fn empty_input_decodes_empty() {
        assert!(parse_dtc_records(&[]).is_empty());
        assert!(parse_dtc_records(&[0x01, 0x02, 0x03]).is_empty());
    }

    #[test]
    fn duplicates_are_not_merged() {
        let payload = [0x03, 0x00, 0x00, 0x08, 0x03, 0x00, 0x00, 0x08];
        let dtcs = parse_dtc_records(&payload);
        assert_eq!(dtcs.len(), 2);
        assert_eq!(dtcs[0], dtcs[1]);
    }
}
