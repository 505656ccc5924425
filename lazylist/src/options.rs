use crate::{ConflictPolicy, ItemSizing};

/// Configuration shared by the virtualizer, the loader and the optimistic store.
///
/// The defaults render 3 extra items on each side of the viewport, estimate unmeasured items at
/// 40 units and start fetching the next page once the rendered window reaches the last 5 loaded
/// items.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ListOptions {
    /// Extent used for items that have not been measured yet.
    pub estimated_size: u32,
    /// Extra items rendered before and after the visible range.
    pub overscan: usize,
    /// How close (in items) the rendered window may get to the loaded tail before the next page
    /// is requested.
    pub lookahead_threshold: usize,
    pub sizing: ItemSizing,
    pub conflict_policy: ConflictPolicy,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            estimated_size: 40,
            overscan: 3,
            lookahead_threshold: 5,
            sizing: ItemSizing::Measured,
            conflict_policy: ConflictPolicy::default(),
        }
    }
}

impl ListOptions {
    /// Options for rows that all share the same extent.
    pub fn fixed(item_size: u32) -> Self {
        Self {
            estimated_size: item_size,
            sizing: ItemSizing::Fixed(item_size),
            ..Self::default()
        }
    }

    /// Options for rows measured by the host after they render.
    pub fn measured(estimated_size: u32) -> Self {
        Self {
            estimated_size,
            sizing: ItemSizing::Measured,
            ..Self::default()
        }
    }

    pub fn with_overscan(mut self, overscan: usize) -> Self {
        self.overscan = overscan;
        self
    }

    pub fn with_estimated_size(mut self, estimated_size: u32) -> Self {
        self.estimated_size = estimated_size;
        self
    }

    pub fn with_lookahead_threshold(mut self, lookahead_threshold: usize) -> Self {
        self.lookahead_threshold = lookahead_threshold;
        self
    }

    pub fn with_sizing(mut self, sizing: ItemSizing) -> Self {
        self.sizing = sizing;
        self
    }

    pub fn with_conflict_policy(mut self, conflict_policy: ConflictPolicy) -> Self {
        self.conflict_policy = conflict_policy;
        self
    }

    /// Extent used for an item with no cached measurement.
    pub fn default_size(&self) -> u32 {
        match self.sizing {
            ItemSizing::Fixed(size) => size,
            ItemSizing::Measured => self.estimated_size,
        }
    }
}
