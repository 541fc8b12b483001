use crate::isotp::Reassembler;

/// UDS ReadDataByIdentifier
pub const SERVICE_READ_DATA_BY_IDENTIFIER: u8 = 0x22;

/// Added to the request service ID in a positive response
pub const POSITIVE_RESPONSE_OFFSET: u8 = 0x40;

/// The DID holding the high-voltage battery current
pub const DID_HV_CURRENT: u16 = 0x1f9a;

/// The verbatim request line: service, DID, and a hint to the adapter that two
/// response frames are expected.
pub(crate) const REQUEST: &str = "221F9A2";

/// The fixed response header: positive response service byte followed by the DID
pub(crate) const SIGNATURE: [u8; 3] = [
    SERVICE_READ_DATA_BY_IDENTIFIER + POSITIVE_RESPONSE_OFFSET,
    (DID_HV_CURRENT >> 8) as u8,
    DID_HV_CURRENT as u8,
];

/// Offset of the big-endian signed raw current within the payload
const CURRENT_OFFSET: usize = 7;

/// Amps per raw count
const CURRENT_RESOLUTION_A: f32 = 0.1;

/// A validated response to [`REQUEST`].
///
/// Payload layout:
///
/// Offset | Meaning
/// 0      | Positive response service byte 0x62
/// 1..3   | DID 0x1F9A
/// 3..7   | Not used
/// 7..9   | Battery current, signed, big-endian, 0.1 A per count
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct CurrentMessage {
    raw: i16,
}

impl CurrentMessage {
    /// Returns `None` unless the payload carries our signature and is long enough
    /// to hold the current.
    pub fn parse(payload: &[u8]) -> Option<Self> {
        if !is_current_response(payload) {
            return None;
        }
        let bytes = payload.get(CURRENT_OFFSET..CURRENT_OFFSET + 2)?;
        Some(Self {
            raw: i16::from_be_bytes([bytes[0], bytes[1]]),
        })
    }

    /// Parse the session's payload, if the session is complete.
    pub fn from_session(session: &Reassembler) -> Option<Self> {
        session.payload().and_then(Self::parse)
    }

    pub fn raw(&self) -> i16 {
        self.raw
    }

    /// The battery current in A. Positive while discharging.
    pub fn amps(&self) -> f32 {
        self.raw as f32 * CURRENT_RESOLUTION_A
    }
}

/// Whether a completed payload is a response to our request at all.
pub(crate) fn is_current_response(payload: &[u8]) -> bool {
    payload.len() >= SIGNATURE.len() && payload[..SIGNATURE.len()] == SIGNATURE
}

#[cfg(test)]
fn session(frames: &[&str]) -> Reassembler {
    let mut r = Reassembler::new();
    for f in frames {
        let mut bytes = [0u8; 8];
        hex::decode_to_slice(f, &mut bytes).unwrap();
        r.feed(&crate::frame::CanFrame(bytes));
    }
    r
}

#[test]
fn test_signature_constant() {
    assert_eq!(SIGNATURE, [0x62, 0x1f, 0x9a]);
    assert!(REQUEST.starts_with(&hex::encode_upper([SERVICE_READ_DATA_BY_IDENTIFIER])));
}

#[test]
fn test_parse_positive_current() {
    let payload = hex::decode("621f9a00000000007b").unwrap();
    let msg = CurrentMessage::parse(&payload).unwrap();
    assert_eq!(msg.raw(), 123);
    assert!((msg.amps() - 12.3).abs() < 1e-4);
}

#[test]
fn test_parse_ignores_trailing_bytes() {
    let payload = hex::decode("621f9a00000000007bffff").unwrap();
    assert_eq!(CurrentMessage::parse(&payload).unwrap().raw(), 123);
}

#[test]
fn test_parse_negative_current() {
    let payload = hex::decode("621f9a0000000000ff85").unwrap();
    assert_eq!(CurrentMessage::parse(&payload).unwrap().raw(), 0x00ff);

    let payload = hex::decode("621f9a00000000ff85").unwrap();
    let msg = CurrentMessage::parse(&payload).unwrap();
    assert_eq!(msg.raw(), -123);
    assert!((msg.amps() + 12.3).abs() < 1e-4);
}

#[test]
fn test_parse_extremes() {
    let max = hex::decode("621f9a000000007fff").unwrap();
    assert!((CurrentMessage::parse(&max).unwrap().amps() - 3276.7).abs() < 1e-2);
    let min = hex::decode("621f9a000000008000").unwrap();
    assert!((CurrentMessage::parse(&min).unwrap().amps() + 3276.8).abs() < 1e-2);
}

#[test]
fn test_parse_too_short() {
    let payload = hex::decode("621f9a000000007b").unwrap();
    assert_eq!(CurrentMessage::parse(&payload), None);
    assert_eq!(CurrentMessage::parse(&[0x62, 0x1f]), None);
    assert_eq!(CurrentMessage::parse(&[]), None);
}

#[test]
fn test_parse_wrong_signature() {
    let payload = hex::decode("621f9b00000000007b").unwrap();
    assert_eq!(CurrentMessage::parse(&payload), None);
    let payload = hex::decode("7f2231").unwrap();
    assert!(!is_current_response(&payload));
}

#[test]
fn test_from_session_multi_frame() {
    // First Frame declaring 9 bytes, then one Consecutive Frame
    let r = session(&["1009621F9A010203", "2104007B00000000"]);
    let msg = CurrentMessage::from_session(&r).unwrap();
    assert!((msg.amps() - 12.3).abs() < 1e-4);
}

#[test]
fn test_from_session_incomplete() {
    let r = session(&["1009621F9A010203"]);
    assert_eq!(CurrentMessage::from_session(&r), None);
}

#[test]
fn test_from_session_single_frame_too_short() {
    let r = session(&["07621F9A01020304"]);
    assert!(r.is_complete());
    assert_eq!(CurrentMessage::from_session(&r), None);
}
