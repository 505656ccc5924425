use lazylist::ListOptions;

/// Configuration of a [`crate::ListSession`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SessionOptions {
    pub list: ListOptions,
    /// Minimum time between two applied scroll offsets. One animation frame by default.
    pub frame_interval_ms: u64,
    /// Keep the first visible item still when items change above it.
    pub preserve_anchor: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            list: ListOptions::default(),
            frame_interval_ms: 16,
            preserve_anchor: true,
        }
    }
}

impl SessionOptions {
    pub fn new(list: ListOptions) -> Self {
        Self {
            list,
            ..Self::default()
        }
    }

    pub fn with_frame_interval_ms(mut self, frame_interval_ms: u64) -> Self {
        self.frame_interval_ms = frame_interval_ms;
        self
    }

    pub fn with_preserve_anchor(mut self, preserve_anchor: bool) -> Self {
        self.preserve_anchor = preserve_anchor;
        self
    }
}
