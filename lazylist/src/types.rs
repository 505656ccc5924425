use alloc::vec::Vec;
use core::ops::Range;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Align {
    Start,
    Center,
    End,
    Auto,
}

/// How item extents along the scroll axis are determined.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ItemSizing {
    /// Every item has the same extent; measurements are ignored.
    Fixed(u32),
    /// Items use `estimated_size` until the host reports a measurement.
    Measured,
}

/// The window of indexes a list binding must render.
///
/// All indexes are inclusive and satisfy
/// `overscan_start <= start_index <= end_index <= overscan_end < count`.
/// An empty window (no items, or a zero-sized viewport) is represented as `None` by every API
/// returning a range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WindowRange {
    pub start_index: usize,
    pub end_index: usize,
    pub overscan_start: usize,
    pub overscan_end: usize,
}

impl WindowRange {
    /// Number of strictly visible items.
    pub fn visible_len(&self) -> usize {
        self.end_index - self.start_index + 1
    }

    /// Number of items to render, overscan included.
    pub fn rendered_len(&self) -> usize {
        self.overscan_end - self.overscan_start + 1
    }

    pub fn contains(&self, index: usize) -> bool {
        index >= self.start_index && index <= self.end_index
    }

    pub fn rendered_contains(&self, index: usize) -> bool {
        index >= self.overscan_start && index <= self.overscan_end
    }

    /// The rendered (overscan-inclusive) window as a half-open range, handy for slicing.
    pub fn rendered(&self) -> Range<usize> {
        self.overscan_start..self.overscan_end + 1
    }

    pub fn visible(&self) -> Range<usize> {
        self.start_index..self.end_index + 1
    }
}

/// One page returned by the host's `fetch(cursor)`.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Page<T, C> {
    pub items: Vec<T>,
    pub cursor: Option<C>,
    pub has_more: bool,
}

impl<T, C> Page<T, C> {
    pub fn new(items: Vec<T>, cursor: Option<C>, has_more: bool) -> Self {
        Self {
            items,
            cursor,
            has_more,
        }
    }

    /// A final page: no cursor, nothing more to load.
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            cursor: None,
            has_more: false,
        }
    }

    /// `true` when this page marks the source as exhausted.
    pub fn is_last(&self) -> bool {
        self.cursor.is_none() || !self.has_more
    }
}

/// Position and extent of one item along the scroll axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ItemLayout {
    pub index: usize,
    pub start: u64,
    pub size: u32,
}

impl ItemLayout {
    pub fn end(&self) -> u64 {
        self.start.saturating_add(self.size as u64)
    }
}
