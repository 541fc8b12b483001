/// The header the adapter prints in front of every frame sent by the node we talk to
pub const RESPONSE_HEADER: &str = "7DA";

/// Number of hex digits carrying the 8 data bytes of a frame
const DATA_DIGITS: usize = 16;

/// One classic CAN data frame as printed by the adapter with headers enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanFrame(pub [u8; 8]);

impl CanFrame {
    pub fn bytes(&self) -> &[u8; 8] {
        &self.0
    }
}

/// Attempt to decode a response line of the form `7DA` followed by 16 hex digits.
///
/// Anything after the 16th digit is ignored. Returns `None` for any line that is
/// not a frame from the expected node: short lines, other headers and lines with
/// a non-hex character in the data field. Such lines are adapter noise and are
/// simply skipped by the caller.
pub fn parse_line(line: &str) -> Option<CanFrame> {
    if !line.starts_with(RESPONSE_HEADER) {
        return None;
    }

    let start = RESPONSE_HEADER.len();
    let digits = line.as_bytes().get(start..start + DATA_DIGITS)?;

    let mut bytes = [0u8; 8];
    hex::decode_to_slice(digits, &mut bytes).ok()?;
    Some(CanFrame(bytes))
}

#[test]
fn test_parse_line_happy() {
    let frame = parse_line("7DA2100FF7900000000").unwrap();
    assert_eq!(frame.0, [0x21, 0x00, 0xff, 0x79, 0x00, 0x00, 0x00, 0x00]);
}

#[test]
fn test_parse_line_mixed_case() {
    let upper = parse_line("7DA10096A1F9AABCDEF").unwrap();
    let lower = parse_line("7DA10096a1f9aabcdef").unwrap();
    assert_eq!(upper, lower);
    assert_eq!(upper.0, [0x10, 0x09, 0x6a, 0x1f, 0x9a, 0xab, 0xcd, 0xef]);
}

#[test]
fn test_parse_line_ignores_trailing_text() {
    let frame = parse_line("7DA0662 1F9A003212XYZ");
    assert_eq!(frame, None);

    let frame = parse_line("7DA03621F9A00000000 extra").unwrap();
    assert_eq!(frame.0[0], 0x03);
}

#[test]
fn test_parse_line_too_short() {
    assert_eq!(parse_line("7DA2100FF790000000"), None);
    assert_eq!(parse_line("7DA"), None);
    assert_eq!(parse_line(""), None);
}

#[test]
fn test_parse_line_wrong_header() {
    assert_eq!(parse_line("7E80641001E3210000000"), None);
    assert_eq!(parse_line("7da2100FF7900000000"), None);
    assert_eq!(parse_line("OK"), None);
}

#[test]
fn test_parse_line_non_hex_digit() {
    assert_eq!(parse_line("7DA2100FF790000000G"), None);
    assert_eq!(parse_line("7DA 2100FF790000000"), None);
    assert_eq!(parse_line("7DA2100FF79000000-0"), None);
}

#[test]
fn test_parse_line_multibyte_char() {
    assert_eq!(parse_line("7DA2100FF7900000\u{e9}0"), None);
}
