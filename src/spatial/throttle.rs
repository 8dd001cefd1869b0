//! Time-based debounce for index rebuilds.
//!
//! Rebuilding an index every frame is wasted work while the layout is still
//! settling. The throttle tracks whether positions changed since the last
//! build and allows a rebuild only once `interval_ms` has elapsed.
//! Timestamps come from the host (`performance.now()` in the browser), so the
//! throttle itself never reads a clock.

#[derive(Debug, Clone, PartialEq)]
pub struct RebuildThrottle {
    interval_ms: f64,
    last_build_ms: Option<f64>,
    dirty: bool,
}

impl RebuildThrottle {
    pub fn new(interval_ms: f64) -> Self {
        Self {
            interval_ms: interval_ms.max(0.0),
            last_build_ms: None,
            dirty: false,
        }
    }

    pub fn interval_ms(&self) -> f64 {
        self.interval_ms
    }

    pub fn set_interval_ms(&mut self, interval_ms: f64) {
        self.interval_ms = interval_ms.max(0.0);
    }

    /// Positions changed since the last build.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Whether a rebuild is due at `now_ms`.
    ///
    /// The first build is always due once dirty. A clock that runs backwards
    /// counts as elapsed.
    pub fn should_rebuild(&self, now_ms: f64) -> bool {
        if !self.dirty {
            return false;
        }
        match self.last_build_ms {
            None => true,
            Some(last) => {
                let elapsed = now_ms - last;
                !(elapsed >= 0.0) || elapsed >= self.interval_ms
            }
        }
    }

    pub fn record_build(&mut self, now_ms: f64) {
        self.last_build_ms = Some(now_ms);
        self.dirty = false;
    }

    pub fn last_build_ms(&self) -> Option<f64> {
        self.last_build_ms
    }

    pub fn reset(&mut self) {
        self.last_build_ms = None;
        self.dirty = false;
    }
}

impl Default for RebuildThrottle {
    fn default() -> Self {
        Self::new(5000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_never_rebuilds() {
        let throttle = RebuildThrottle::new(5000.0);
        assert!(!throttle.should_rebuild(0.0));
        assert!(!throttle.should_rebuild(1e9));
    }

    #[test]
    fn test_first_build_is_immediate() {
        let mut throttle = RebuildThrottle::new(5000.0);
        throttle.mark_dirty();
        assert!(throttle.should_rebuild(0.0));
    }

    #[test]
    fn test_debounces_within_interval() {
        let mut throttle = RebuildThrottle::new(5000.0);
        throttle.mark_dirty();
        throttle.record_build(1000.0);
        assert!(!throttle.is_dirty());

        throttle.mark_dirty();
        assert!(!throttle.should_rebuild(2000.0));
        assert!(!throttle.should_rebuild(5999.0));
        assert!(throttle.should_rebuild(6000.0));
    }

    #[test]
    fn test_backwards_clock_allows_rebuild() {
        let mut throttle = RebuildThrottle::new(5000.0);
        throttle.record_build(10_000.0);
        throttle.mark_dirty();
        assert!(throttle.should_rebuild(50.0));
    }

    #[test]
    fn test_reset() {
        let mut throttle = RebuildThrottle::default();
        throttle.mark_dirty();
        throttle.record_build(3.0);
        throttle.mark_dirty();
        throttle.reset();

        assert_eq!(throttle.last_build_ms(), None);
        assert!(!throttle.is_dirty());
        assert_eq!(throttle.interval_ms(), 5000.0);
    }
}
