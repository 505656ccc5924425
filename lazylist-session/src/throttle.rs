/// Coalesces scroll events to at most one applied offset per frame.
///
/// An offset arriving inside the current frame replaces any previously deferred one; the latest
/// deferred offset is released by [`FrameThrottle::flush`] once the frame has elapsed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameThrottle {
    interval_ms: u64,
    last_applied_ms: Option<u64>,
    deferred: Option<i64>,
}

impl FrameThrottle {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            last_applied_ms: None,
            deferred: None,
        }
    }

    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    pub fn set_interval_ms(&mut self, interval_ms: u64) {
        self.interval_ms = interval_ms;
    }

    pub fn has_deferred(&self) -> bool {
        self.deferred.is_some()
    }

    /// Returns `offset` if it may be applied now, otherwise keeps it for [`Self::flush`].
    pub fn offer(&mut self, offset: i64, now_ms: u64) -> Option<i64> {
        if !self.is_ready(now_ms) {
            self.deferred = Some(offset);
            return None;
        }
        self.last_applied_ms = Some(now_ms);
        self.deferred = None;
        Some(offset)
    }

    /// Releases the deferred offset once the frame has elapsed.
    pub fn flush(&mut self, now_ms: u64) -> Option<i64> {
        if self.deferred.is_none() || !self.is_ready(now_ms) {
            return None;
        }
        self.last_applied_ms = Some(now_ms);
        self.deferred.take()
    }

    pub fn reset(&mut self) {
        self.last_applied_ms = None;
        self.deferred = None;
    }

    fn is_ready(&self, now_ms: u64) -> bool {
        match self.last_applied_ms {
            None => true,
            Some(last) => now_ms.saturating_sub(last) >= self.interval_ms,
        }
    }
}
