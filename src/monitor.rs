use std::time::{Duration, Instant};

use tracing::{debug, info, trace};

use crate::filter::{CurrentFilter, Reading};
use crate::frame::{self, RESPONSE_HEADER};
use crate::isotp::{Reassembler, SessionState};
use crate::line_buffer::LineBuffer;
use crate::message::current_message::CurrentMessage;

/// How long an unfinished segmented response may sit without a new frame by default
pub const DEFAULT_REASSEMBLY_TIMEOUT: Duration = Duration::from_millis(1000);

/// Turns the raw byte stream from the adapter into a filtered battery current.
///
/// Owns all protocol state: the pending line, the reassembly session and the
/// filter. Everything here is synchronous and never waits.
#[derive(Debug)]
pub struct CurrentMonitor {
    lines: LineBuffer,
    session: Reassembler,
    filter: CurrentFilter,
    reassembly_timeout: Duration,
    last_frame: Option<Instant>,
}

impl CurrentMonitor {
    pub fn new(freshness: Duration, reassembly_timeout: Duration) -> Self {
        Self {
            lines: LineBuffer::new(),
            session: Reassembler::new(),
            filter: CurrentFilter::new(freshness),
            reassembly_timeout,
            last_frame: None,
        }
    }

    /// Forget any partial line and reassembly. The filter keeps its value.
    pub fn reset(&mut self) {
        self.lines.clear();
        self.session.reset();
        self.last_frame = None;
    }

    /// Process bytes received at `now`. Returns the latest filtered current if
    /// at least one sample was accepted.
    pub fn ingest(&mut self, data: &[u8], now: Instant) -> Option<f32> {
        let mut filtered = None;
        for &byte in data {
            if let Some(line) = self.lines.push(byte) {
                if let Some(amps) = self.handle_line(&line, now) {
                    filtered = Some(amps);
                }
            }
        }
        filtered
    }

    fn handle_line(&mut self, line: &str, now: Instant) -> Option<f32> {
        if !line.starts_with(RESPONSE_HEADER) {
            trace!("RX: {line}");
            return None;
        }
        let frame = frame::parse_line(line)?;
        debug!("RX frame: {line}");

        if !self.session.feed(&frame) {
            debug!("Ignoring frame outside of the current session");
            return None;
        }
        self.last_frame = Some(now);

        if self.session.state() != SessionState::Complete {
            return None;
        }

        let result = match CurrentMessage::from_session(&self.session) {
            Some(msg) => {
                let filtered = self.filter.update(msg.amps(), now);
                debug!("Sample raw={} amps={:.1}", msg.raw(), msg.amps());
                info!("HV Current: {filtered:+.1} A");
                Some(filtered)
            }
            None => {
                let payload = self.session.payload().unwrap_or_default();
                debug!("Discarding unrelated response: {}", hex::encode(payload));
                None
            }
        };
        self.session.reset();
        result
    }

    /// Abandon a segmented response that stopped receiving frames. Returns
    /// whether the session was reset.
    pub fn expire_stalled(&mut self, now: Instant) -> bool {
        if self.session.state() != SessionState::Collecting {
            return false;
        }
        let stalled = self
            .last_frame
            .map_or(true, |t| now.saturating_duration_since(t) > self.reassembly_timeout);
        if stalled {
            debug!(
                "Abandoning stalled reassembly: {}/{} bytes",
                self.session.have_len(),
                self.session.expected_len()
            );
            self.session.reset();
        }
        stalled
    }

    pub fn reading(&self, now: Instant) -> Reading {
        self.filter.reading(now)
    }

    pub fn session(&self) -> &Reassembler {
        &self.session
    }
}

impl Default for CurrentMonitor {
    fn default() -> Self {
        Self::new(crate::filter::DEFAULT_FRESHNESS, DEFAULT_REASSEMBLY_TIMEOUT)
    }
}

#[test]
fn test_end_to_end_multi_frame() {
    let mut monitor = CurrentMonitor::default();
    let now = Instant::now();

    let amps = monitor.ingest(b"7DA1009621F9A010203\r7DA2104007B00000000\r\r>", now);
    let expected = 0.15 * 12.3;
    assert!((amps.unwrap() - expected).abs() < 1e-4);

    let reading = monitor.reading(now);
    assert!(reading.live);
    assert!((reading.amps - expected).abs() < 1e-4);
    assert_eq!(monitor.session().state(), SessionState::Idle);
}

#[test]
fn test_split_across_notifications() {
    let mut monitor = CurrentMonitor::default();
    let now = Instant::now();
    assert_eq!(monitor.ingest(b"7DA1009621F9A01", now), None);
    assert_eq!(monitor.ingest(b"0203\r\n7DA2104007B", now), None);
    assert_eq!(monitor.session().state(), SessionState::Collecting);
    assert!(monitor.ingest(b"00000000\r\n>", now).is_some());
}

#[test]
fn test_noise_lines_ignored() {
    let mut monitor = CurrentMonitor::default();
    let now = Instant::now();
    let amps = monitor.ingest(b"SEARCHING...\rOK\r7E8064100BE3FA813\rNO DATA\r>", now);
    assert_eq!(amps, None);
    assert_eq!(monitor.session().state(), SessionState::Idle);
    assert!(!monitor.reading(now).live);
}

#[test]
fn test_unrelated_response_discarded() {
    let mut monitor = CurrentMonitor::default();
    let now = Instant::now();
    assert_eq!(monitor.ingest(b"7DA037F221100000000\r", now), None);
    assert_eq!(monitor.session().state(), SessionState::Idle);
    assert_eq!(monitor.reading(now).amps, 0.0);
}

#[test]
fn test_several_samples_filtered() {
    let mut monitor = CurrentMonitor::default();
    let now = Instant::now();
    let response = b"7DA1009621F9A010203\r7DA2104006400000000\r";
    monitor.ingest(response, now);
    let amps = monitor.ingest(response, now).unwrap();
    // raw 100 -> 10.0 A twice
    let first = 0.15 * 10.0f32;
    assert!((amps - (0.85 * first + 0.15 * 10.0)).abs() < 1e-4);
}

#[test]
fn test_stalled_reassembly_expires() {
    let mut monitor = CurrentMonitor::default();
    let t = Instant::now();
    monitor.ingest(b"7DA1009621F9A010203\r", t);
    assert!(!monitor.expire_stalled(t + Duration::from_millis(1000)));
    assert_eq!(monitor.session().state(), SessionState::Collecting);

    assert!(monitor.expire_stalled(t + Duration::from_millis(1001)));
    assert_eq!(monitor.session().state(), SessionState::Idle);

    // the continuation is now an orphan
    assert_eq!(monitor.ingest(b"7DA2104007B00000000\r", t), None);
}

#[test]
fn test_ignored_frames_do_not_keep_stalled_session_alive() {
    let mut monitor = CurrentMonitor::default();
    let t = Instant::now();
    monitor.ingest(b"7DA1009621F9A010203\r", t);

    let noise = t + Duration::from_millis(900);
    monitor.ingest(b"7DA3000000000000000\r7DA0811223344556677\r7DA1041000000000000\r", noise);
    assert!(!monitor.expire_stalled(noise));
    assert_eq!(monitor.session().state(), SessionState::Collecting);

    assert!(monitor.expire_stalled(t + Duration::from_millis(1001)));
    assert_eq!(monitor.session().state(), SessionState::Idle);
}

#[test]
fn test_reset_keeps_filter() {
    let mut monitor = CurrentMonitor::default();
    let now = Instant::now();
    monitor.ingest(b"7DA1009621F9A010203\r7DA2104007B00000000\r7DA10", now);
    let before = monitor.reading(now);
    monitor.reset();
    assert_eq!(monitor.reading(now), before);
    assert_eq!(monitor.ingest(b"09621F9A010203\r", now), None);
    assert_eq!(monitor.session().state(), SessionState::Idle);
}
