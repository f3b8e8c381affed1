//! DOIP (ISO13400) wire format helpers for the GT100 Ethernet path
//!
//! Only the small slice of the protocol the GT100 activation exchange uses
//! is modelled: a fixed 11-byte vehicle identification request and a 4-byte
//! response header check. No routing activation handshake beyond this is
//! attempted.

/// Leading bytes of the activation request frame
pub const ACTIVATION_REQUEST_HEADER: [u8; 4] = [0x02, 0x00, 0x00, 0x04];
/// Expected leading bytes of a valid activation response
pub const ACTIVATION_RESPONSE_HEADER: [u8; 4] = [0x02, 0x00, 0x00, 0x05];
/// Leading bytes of a diagnostic message frame
pub const DIAGNOSTIC_MESSAGE_HEADER: [u8; 4] = [0x02, 0x00, 0x00, 0x08];

/// DOIP protocol version spoken by the GT100
pub const PROTOCOL_VERSION: u8 = 0x02;

/// Payload type: vehicle identification request
pub const PAYLOAD_TYPE_VEHICLE_ID_REQUEST: u16 = 0x0004;
/// Payload type: diagnostic message
pub const PAYLOAD_TYPE_DIAGNOSTIC_MESSAGE: u16 = 0x0008;

/// Standard DOIP TCP data port
pub const DOIP_PORT: u16 = 13400;

/// Builds the fixed 11-byte activation request sent immediately after the
/// TCP connect: header, protocol version, vehicle-ID payload type and a
/// 4-byte zero payload length.
pub fn vehicle_identification_request() -> [u8; 11] {
    let mut frame = [0u8; 11];
    frame[..4].copy_from_slice(&ACTIVATION_REQUEST_HEADER);
    frame[4] = PROTOCOL_VERSION;
    frame[5..7].copy_from_slice(&PAYLOAD_TYPE_VEHICLE_ID_REQUEST.to_be_bytes());
    // 4-byte payload length = 0, already zeroed
    frame
}

/// Validates an activation response. Anything shorter than 4 bytes, or with
/// a different leading header, is a failed activation.
pub fn is_activation_response(response: &[u8]) -> bool {
    response.len() >= 4 && response[..4] == ACTIVATION_RESPONSE_HEADER
}

/// Builds a diagnostic message frame carrying a UDS payload to the given
/// ECU logical address. Used when switching the GT100 into DOIP diagnostics
/// (the payload there is DiagnosticSessionControl `10 01`).
pub fn diagnostic_message(ecu_address: u16, uds_payload: &[u8]) -> Vec<u8> {
    let payload_len = (uds_payload.len() + 2) as u32;
    let mut frame = Vec::with_capacity(11 + 2 + uds_payload.len());
    frame.extend_from_slice(&DIAGNOSTIC_MESSAGE_HEADER);
    frame.push(PROTOCOL_VERSION);
    frame.extend_from_slice(&PAYLOAD_TYPE_DIAGNOSTIC_MESSAGE.to_be_bytes());
    frame.extend_from_slice(&payload_len.to_be_bytes());
    frame.extend_from_slice(&ecu_address.to_be_bytes());
    frame.extend_from_slice(uds_payload);
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activation_request_matches_wire_format() {
        assert_eq!(
            vehicle_identification_request(),
            [0x02, 0x00, 0x00, 0x04, 0x02, 0x00, 0x04, 0x00, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn activation_response_validation() {
        assert!(is_activation_response(&[0x02, 0x00, 0x00, 0x05]));
        assert!(is_activation_response(&[0x02, 0x00, 0x00, 0x05, 0xAA, 0xBB]));
        // Short, empty and mismatched headers all fail
        assert!(!is_activation_response(&[]));
        assert!(!is_activation_response(&[0x02, 0x00, 0x00]));
        assert!(!is_activation_response(&[0x02, 0x00, 0x00, 0x04]));
        assert!(!is_activation_response(&[0x03, 0x00, 0x00, 0x05]));
    }

    #[test]
    fn diagnostic_message_layout() {
        let frame = diagnostic_message(0x07E0, &[0x10, 0x01]);
        assert_eq!(&frame[..4], &DIAGNOSTIC_MESSAGE_HEADER);
        assert_eq!(frame[4], PROTOCOL_VERSION);
        assert_eq!(&frame[5..7], &[0x00, 0x08]);
        assert_eq!(&frame[7..11], &[0x00, 0x00, 0x00, 0x04]);
        assert_eq!(&frame[11..13], &[0x07, 0xE0]);
        assert_eq!(&frame[13..], &[0x10, 0x01]);
    }
}
