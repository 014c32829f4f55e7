use std::time::{Duration, Instant};

/// Default window in which a repeated decode of the same payload is ignored.
pub const SCAN_COOLDOWN: Duration = Duration::from_secs(2);

/// Drops repeated camera decodes of the same QR payload.
///
/// A different payload is always admitted and restarts the window.
#[derive(Debug)]
pub struct ScanDebouncer {
    cooldown: Duration,
    last: Option<(String, Instant)>,
}

impl Default for ScanDebouncer {
    fn default() -> Self {
        Self::new(SCAN_COOLDOWN)
    }
}

impl ScanDebouncer {
    pub fn new(cooldown: Duration) -> Self {
        Self { cooldown, last: None }
    }

    /// Whether a decode of `payload` at `now` should be acted on.
    pub fn admit_at(&mut self, payload: &str, now: Instant) -> bool {
        if let Some((last_payload, at)) = &self.last {
            if last_payload == payload && now.saturating_duration_since(*at) < self.cooldown {
                return false;
            }
        }
        self.last = Some((payload.to_string(), now));
        true
    }

    pub fn admit(&mut self, payload: &str) -> bool {
        self.admit_at(payload, Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_payload_inside_window_is_dropped() {
        let mut debouncer = ScanDebouncer::default();
        let t0 = Instant::now();

        assert!(debouncer.admit_at("abc", t0));
        assert!(!debouncer.admit_at("abc", t0 + Duration::from_millis(1500)));
        assert!(debouncer.admit_at("abc", t0 + Duration::from_millis(2000)));
    }

    #[test]
    fn different_payload_is_admitted_immediately() {
        let mut debouncer = ScanDebouncer::default();
        let t0 = Instant::now();

        assert!(debouncer.admit_at("abc", t0));
        assert!(debouncer.admit_at("xyz", t0 + Duration::from_millis(10)));
        assert!(debouncer.admit_at("abc", t0 + Duration::from_millis(20)));
    }
}
