use std::time::Duration;

const fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

/// Commands sent once after connecting, each with the time to wait before the next.
///
/// Leaves the adapter with echo off, headers on, no spaces, adaptive timing and
/// requests addressed to 0x7D2 (responses come from 0x7DA). The two `0100`
/// queries wake the bus and let the adapter settle on a protocol.
pub const INIT_SEQUENCE: &[(&str, Duration)] = &[
    ("ATZ", ms(900)),
    ("ATD0", ms(250)),
    ("ATE0", ms(120)),
    ("ATH1", ms(120)),
    ("ATSP0", ms(250)),
    ("ATM0", ms(120)),
    ("ATS0", ms(120)),
    ("ATAT1", ms(120)),
    ("ATAL", ms(120)),
    ("ATST64", ms(120)),
    ("ATSH7DF", ms(120)),
    ("0100", ms(250)),
    ("ATST64", ms(120)),
    ("0100", ms(250)),
    ("ATSH7D2", ms(120)),
];

/// Terminates every command sent to the adapter
pub const COMMAND_TERMINATOR: &str = "\r";

/// The bytes to write for `command`
pub fn encode_command(command: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(command.len() + COMMAND_TERMINATOR.len());
    bytes.extend_from_slice(command.as_bytes());
    bytes.extend_from_slice(COMMAND_TERMINATOR.as_bytes());
    bytes
}

#[test]
fn test_encode_command() {
    assert_eq!(encode_command("ATZ"), b"ATZ\r");
    assert_eq!(encode_command(crate::message::current_message::REQUEST), b"221F9A2\r");
}

#[test]
fn test_init_sequence_shape() {
    assert_eq!(INIT_SEQUENCE.first().map(|c| c.0), Some("ATZ"));
    assert_eq!(INIT_SEQUENCE.last().map(|c| c.0), Some("ATSH7D2"));
    assert!(INIT_SEQUENCE.iter().any(|c| c.0 == "ATE0"));
    assert!(INIT_SEQUENCE.iter().any(|c| c.0 == "ATH1"));
    let total: Duration = INIT_SEQUENCE.iter().map(|c| c.1).sum();
    assert_eq!(total, Duration::from_millis(3100));
}
