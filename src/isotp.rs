//! Receive-only ISO 15765-2 (ISO-TP) reassembly.
//!
//! Frames are fed in arrival order and accumulate into a single bounded payload.
//! There is exactly one session in flight; it is not keyed by CAN ID and flow
//! control frames are never sent.

use crate::frame::CanFrame;

/// Largest payload we are prepared to reassemble
pub const PAYLOAD_CAPACITY: usize = 64;

const SINGLE_FRAME_MAX_LEN: usize = 7;
const FIRST_FRAME_DATA_LEN: usize = 6;

/// The Protocol Control Information of a frame, decoded from its first byte(s).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pci {
    /// Type 0. The whole payload fits in this frame.
    SingleFrame { len: usize },
    /// Type 1. Starts a segmented payload of `len` bytes.
    FirstFrame { len: usize },
    /// Type 2. Continues a segmented payload.
    ConsecutiveFrame { sequence: u8 },
    /// Flow control, or a type this adapter path never produces.
    Other(u8),
}

impl Pci {
    pub fn decode(frame: &CanFrame) -> Self {
        let b = frame.bytes();
        match b[0] >> 4 {
            0x0 => Pci::SingleFrame {
                len: (b[0] & 0x0f) as usize,
            },
            0x1 => Pci::FirstFrame {
                len: (((b[0] & 0x0f) as usize) << 8) | b[1] as usize,
            },
            0x2 => Pci::ConsecutiveFrame {
                sequence: b[0] & 0x0f,
            },
            other => Pci::Other(other),
        }
    }
}

/// A fixed capacity byte buffer. Appends never write past the capacity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    bytes: [u8; PAYLOAD_CAPACITY],
    len: usize,
}

impl Payload {
    pub const fn new() -> Self {
        Self {
            bytes: [0; PAYLOAD_CAPACITY],
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Append as much of `data` as fits within `limit` (and the capacity).
    /// Returns the number of bytes copied.
    fn extend_up_to(&mut self, data: &[u8], limit: usize) -> usize {
        let room = limit.min(PAYLOAD_CAPACITY).saturating_sub(self.len);
        let n = data.len().min(room);
        self.bytes[self.len..self.len + n].copy_from_slice(&data[..n]);
        self.len += n;
        n
    }
}

impl Default for Payload {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Collecting,
    Complete,
}

/// The reassembly session.
///
/// Invariant: `payload.len() <= expected_len <= PAYLOAD_CAPACITY`, and
/// `collecting` is only set while a segmented payload is incomplete.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Reassembler {
    collecting: bool,
    expected_len: usize,
    payload: Payload,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Back to idle. Call after consuming a completed payload and on every
    /// (re)connection to the adapter.
    pub fn reset(&mut self) {
        self.collecting = false;
        self.expected_len = 0;
        self.payload.clear();
    }

    pub fn state(&self) -> SessionState {
        if self.collecting {
            SessionState::Collecting
        } else if self.is_complete() {
            SessionState::Complete
        } else {
            SessionState::Idle
        }
    }

    pub fn is_complete(&self) -> bool {
        self.expected_len > 0 && self.payload.len() >= self.expected_len
    }

    pub fn expected_len(&self) -> usize {
        self.expected_len
    }

    pub fn have_len(&self) -> usize {
        self.payload.len()
    }

    /// The reassembled payload, once complete.
    pub fn payload(&self) -> Option<&[u8]> {
        self.is_complete().then(|| self.payload.as_slice())
    }

    /// Feed the next frame. Frames that do not fit the current state are ignored
    /// and leave the session untouched. Returns whether the frame was taken.
    pub fn feed(&mut self, frame: &CanFrame) -> bool {
        let b = frame.bytes();
        match Pci::decode(frame) {
            Pci::SingleFrame { len } => {
                if len == 0 || len > SINGLE_FRAME_MAX_LEN {
                    return false;
                }
                self.restart(len, &b[1..]);
            }
            Pci::FirstFrame { len } => {
                if len == 0 || len > PAYLOAD_CAPACITY {
                    return false;
                }
                self.restart(len, &b[2..2 + FIRST_FRAME_DATA_LEN]);
            }
            Pci::ConsecutiveFrame { .. } => {
                if !self.collecting {
                    return false;
                }
                self.payload.extend_up_to(&b[1..], self.expected_len);
                self.collecting = self.payload.len() < self.expected_len;
            }
            Pci::Other(_) => return false,
        }
        true
    }

    fn restart(&mut self, len: usize, data: &[u8]) {
        self.expected_len = len;
        self.payload.clear();
        self.payload.extend_up_to(data, len);
        self.collecting = self.payload.len() < len;
    }
}

#[cfg(test)]
fn frame(s: &str) -> CanFrame {
    let mut bytes = [0u8; 8];
    hex::decode_to_slice(s, &mut bytes).unwrap();
    CanFrame(bytes)
}

#[test]
fn test_pci_decode() {
    assert_eq!(Pci::decode(&frame("0562AABBCCDD0000")), Pci::SingleFrame { len: 5 });
    assert_eq!(Pci::decode(&frame("1123000000000000")), Pci::FirstFrame { len: 0x123 });
    assert_eq!(Pci::decode(&frame("2F00000000000000")), Pci::ConsecutiveFrame { sequence: 0xf });
    assert_eq!(Pci::decode(&frame("3000000000000000")), Pci::Other(3));
}

#[test]
fn test_single_frame_completes() {
    let mut r = Reassembler::new();
    r.feed(&frame("03621F9A00000000"));
    assert_eq!(r.state(), SessionState::Complete);
    assert_eq!(r.have_len(), 3);
    assert_eq!(r.payload(), Some(&[0x62, 0x1f, 0x9a][..]));
}

#[test]
fn test_single_frame_every_length() {
    let f = frame("0011223344556677");
    for len in 1..=7u8 {
        let mut bytes = *f.bytes();
        bytes[0] = len;
        let mut r = Reassembler::new();
        r.feed(&CanFrame(bytes));
        assert_eq!(r.have_len(), len as usize);
        assert_eq!(r.payload().unwrap(), &bytes[1..1 + len as usize]);
    }
}

#[test]
fn test_single_frame_overrides_collecting_session() {
    let mut r = Reassembler::new();
    r.feed(&frame("1014621F9A010203"));
    assert_eq!(r.state(), SessionState::Collecting);

    r.feed(&frame("02AABB0000000000"));
    assert_eq!(r.state(), SessionState::Complete);
    assert_eq!(r.payload(), Some(&[0xaa, 0xbb][..]));
}

#[test]
fn test_single_frame_invalid_length_ignored() {
    let mut r = Reassembler::new();
    r.feed(&frame("1009621F9A010203"));
    let before = r.clone();

    r.feed(&frame("0011223344556677"));
    assert_eq!(r, before);
    r.feed(&frame("0811223344556677"));
    assert_eq!(r, before);
}

#[test]
fn test_first_frame_then_consecutive() {
    let mut r = Reassembler::new();
    r.feed(&frame("1014010203040506"));
    assert_eq!(r.state(), SessionState::Collecting);
    assert_eq!(r.expected_len(), 20);
    assert_eq!(r.have_len(), 6);
    assert_eq!(r.payload(), None);

    r.feed(&frame("210708090A0B0C0D"));
    assert_eq!(r.have_len(), 13);
    r.feed(&frame("220E0F1011121314"));
    assert_eq!(r.state(), SessionState::Complete);
    assert_eq!(r.payload().unwrap(), (1..=20).collect::<Vec<u8>>().as_slice());
}

#[test]
fn test_first_frame_max_capacity() {
    let mut r = Reassembler::new();
    r.feed(&frame("1040000000000000"));
    // (64 - 6) / 7 rounded up
    for i in 0..9u8 {
        assert_eq!(r.state(), SessionState::Collecting);
        let mut bytes = [0xee; 8];
        bytes[0] = 0x20 | ((i + 1) & 0x0f);
        r.feed(&CanFrame(bytes));
    }
    assert_eq!(r.state(), SessionState::Complete);
    assert_eq!(r.have_len(), 64);
}

#[test]
fn test_first_frame_over_capacity_ignored() {
    let mut r = Reassembler::new();
    r.feed(&frame("03621F9A00000000"));
    let before = r.clone();

    r.feed(&frame("1041000000000000"));
    assert_eq!(r, before);
    r.feed(&frame("1000000000000000"));
    assert_eq!(r, before);
}

#[test]
fn test_short_first_frame_completes_immediately() {
    let mut r = Reassembler::new();
    r.feed(&frame("1004AABBCCDDEEFF"));
    assert_eq!(r.state(), SessionState::Complete);
    assert_eq!(r.payload(), Some(&[0xaa, 0xbb, 0xcc, 0xdd][..]));
}

#[test]
fn test_consecutive_frame_while_idle_is_noop() {
    let mut r = Reassembler::new();
    r.feed(&frame("2111223344556677"));
    assert_eq!(r, Reassembler::new());
    assert_eq!(r.state(), SessionState::Idle);
}

#[test]
fn test_consecutive_frame_after_complete_is_noop() {
    let mut r = Reassembler::new();
    r.feed(&frame("02AABB0000000000"));
    let before = r.clone();
    r.feed(&frame("2111223344556677"));
    assert_eq!(r, before);
}

#[test]
fn test_consecutive_frame_stops_at_expected_len() {
    let mut r = Reassembler::new();
    r.feed(&frame("1008010203040506"));
    r.feed(&frame("2107080000000000"));
    assert_eq!(r.payload().unwrap(), &[1, 2, 3, 4, 5, 6, 7, 8]);
}

#[test]
fn test_other_pci_types_ignored() {
    let mut r = Reassembler::new();
    r.feed(&frame("1014010203040506"));
    let before = r.clone();
    r.feed(&frame("3000000000000000"));
    r.feed(&frame("7F22310000000000"));
    r.feed(&frame("F000000000000000"));
    assert_eq!(r, before);
}

#[test]
fn test_reset() {
    let mut r = Reassembler::new();
    r.feed(&frame("1014010203040506"));
    r.reset();
    assert_eq!(r.state(), SessionState::Idle);
    assert_eq!(r.expected_len(), 0);
    assert_eq!(r.have_len(), 0);
}

#[test]
fn test_feed_reports_taken_frames() {
    let mut r = Reassembler::new();
    assert!(!r.feed(&frame("2111223344556677")));
    assert!(!r.feed(&frame("3000000000000000")));
    assert!(!r.feed(&frame("0811223344556677")));
    assert!(r.feed(&frame("1009621F9A010203")));
    assert!(!r.feed(&frame("1041000000000000")));
    assert!(r.feed(&frame("2104007B00000000")));
    assert!(r.feed(&frame("02AABB0000000000")));
}
