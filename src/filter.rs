use std::time::{Duration, Instant};

/// Weight of the previous filtered value
const HISTORY_WEIGHT: f32 = 0.85;
/// Weight of a new sample
const SAMPLE_WEIGHT: f32 = 0.15;

/// How long a sample keeps the signal live by default
pub const DEFAULT_FRESHNESS: Duration = Duration::from_millis(1500);

/// What the display needs to know about the current
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    /// The filtered battery current in A
    pub amps: f32,
    /// Whether a sample arrived recently enough for `amps` to mean anything
    pub live: bool,
}

/// Exponential smoothing of the battery current plus the time of the last sample.
#[derive(Debug, Clone)]
pub struct CurrentFilter {
    value: f32,
    last_update: Option<Instant>,
    freshness: Duration,
}

impl CurrentFilter {
    pub fn new(freshness: Duration) -> Self {
        Self {
            value: 0.0,
            last_update: None,
            freshness,
        }
    }

    /// Apply one sample taken at `now` and return the new filtered value.
    pub fn update(&mut self, sample: f32, now: Instant) -> f32 {
        self.value = HISTORY_WEIGHT * self.value + SAMPLE_WEIGHT * sample;
        self.last_update = Some(now);
        self.value
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn last_update(&self) -> Option<Instant> {
        self.last_update
    }

    /// Live while less than the freshness threshold has passed since the last sample.
    pub fn is_live(&self, now: Instant) -> bool {
        self.last_update
            .is_some_and(|t| now.saturating_duration_since(t) < self.freshness)
    }

    pub fn reading(&self, now: Instant) -> Reading {
        Reading {
            amps: self.value,
            live: self.is_live(now),
        }
    }
}

impl Default for CurrentFilter {
    fn default() -> Self {
        Self::new(DEFAULT_FRESHNESS)
    }
}

#[test]
fn test_single_update() {
    let mut filter = CurrentFilter::default();
    let now = Instant::now();
    assert_eq!(filter.update(10.0, now), 0.85 * 0.0 + 0.15 * 10.0);

    let f = filter.value();
    assert_eq!(filter.update(-4.0, now), 0.85 * f + 0.15 * -4.0);
}

#[test]
fn test_converges_to_constant_sample() {
    let mut filter = CurrentFilter::default();
    let now = Instant::now();
    for _ in 0..200 {
        filter.update(42.5, now);
    }
    assert!((filter.value() - 42.5).abs() < 1e-3);
}

#[test]
fn test_starts_at_zero_and_stale() {
    let filter = CurrentFilter::default();
    assert_eq!(filter.value(), 0.0);
    assert_eq!(filter.last_update(), None);
    assert!(!filter.reading(Instant::now()).live);
}

#[test]
fn test_freshness_boundary() {
    let mut filter = CurrentFilter::default();
    let t = Instant::now();
    filter.update(1.0, t);

    assert!(filter.is_live(t));
    assert!(filter.is_live(t + Duration::from_millis(1499)));
    assert!(!filter.is_live(t + Duration::from_millis(1500)));
    assert!(!filter.is_live(t + Duration::from_secs(60)));
}

#[test]
fn test_new_sample_refreshes() {
    let mut filter = CurrentFilter::new(Duration::from_millis(100));
    let t = Instant::now();
    filter.update(1.0, t);
    let later = t + Duration::from_millis(150);
    assert!(!filter.is_live(later));

    filter.update(1.0, later);
    let reading = filter.reading(later + Duration::from_millis(99));
    assert!(reading.live);
    assert_eq!(reading.amps, filter.value());
}
