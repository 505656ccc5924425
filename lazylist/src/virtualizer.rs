use alloc::vec::Vec;
use core::cmp;

use crate::fenwick::Fenwick;
use crate::key::{ItemKey, KeyMap};
use crate::{Align, ItemLayout, ItemSizing, ListOptions, MeasurementError, WindowRange};

/// Computes the window for items that all share `item_size`.
///
/// `start = floor(offset / size)`, `end = ceil((offset + viewport) / size) - 1`, both clamped to
/// the list. Negative offsets are treated as 0 and offsets past the end are clamped to the last
/// full viewport, so the window always covers the viewport when there is enough content.
pub fn fixed_range(
    scroll_offset: i64,
    viewport_extent: i64,
    item_count: usize,
    item_size: u32,
    overscan: usize,
) -> Option<WindowRange> {
    if item_count == 0 || viewport_extent <= 0 {
        return None;
    }
    let last = item_count - 1;
    if item_size == 0 {
        return Some(with_overscan(0, last, last, overscan));
    }

    let size = item_size as u64;
    let view = viewport_extent as u64;
    let total = fixed_total_extent(item_count, item_size);
    let offset = clamp_offset(scroll_offset).min(total.saturating_sub(view));

    let start = (offset / size).min(last as u64) as usize;
    let end = offset.saturating_add(view).div_ceil(size).saturating_sub(1);
    let end = (end.min(last as u64) as usize).max(start);
    Some(with_overscan(start, end, last, overscan))
}

/// Total scrollable extent of `item_count` items of `item_size`.
pub fn fixed_total_extent(item_count: usize, item_size: u32) -> u64 {
    (item_count as u64).saturating_mul(item_size as u64)
}

fn with_overscan(start: usize, end: usize, last: usize, overscan: usize) -> WindowRange {
    WindowRange {
        start_index: start,
        end_index: end,
        overscan_start: start.saturating_sub(overscan),
        overscan_end: cmp::min(last, end.saturating_add(overscan)),
    }
}

fn clamp_offset(offset: i64) -> u64 {
    offset.max(0) as u64
}

/// A headless viewport virtualizer over a keyed list.
///
/// The virtualizer never holds items, only their keys and extents:
/// - the host (or the list session) keeps the key sequence in sync via [`Self::sync_keys`] /
///   [`Self::append_keys`];
/// - rendered items report their extent via [`Self::measure`];
/// - scroll offset and viewport extent drive [`Self::range`].
///
/// Extents live in a Fenwick tree, so offset → index lookups are `O(log n)` and a key change only
/// rebuilds the suffix starting at the first changed index.
#[derive(Clone, Debug)]
pub struct Virtualizer<K> {
    options: ListOptions,
    viewport_extent: u32,
    scroll_offset: u64,

    keys: Vec<K>,
    sizes: Vec<u32>,
    measured: Vec<bool>,
    sums: Fenwick,
    index_of: KeyMap<K, usize>,
    size_cache: KeyMap<K, u32>,
}

impl<K: ItemKey> Virtualizer<K> {
    pub fn new(options: ListOptions) -> Self {
        vdebug!(
            overscan = options.overscan,
            estimated_size = options.estimated_size,
            "Virtualizer::new"
        );
        Self {
            options,
            viewport_extent: 0,
            scroll_offset: 0,
            keys: Vec::new(),
            sizes: Vec::new(),
            measured: Vec::new(),
            sums: Fenwick::default(),
            index_of: KeyMap::new(),
            size_cache: KeyMap::new(),
        }
    }

    pub fn options(&self) -> &ListOptions {
        &self.options
    }

    /// Replaces the options, rebuilding extents only when sizing changed.
    pub fn set_options(&mut self, options: ListOptions) {
        let sizing_changed = self.options.sizing != options.sizing
            || self.options.estimated_size != options.estimated_size;
        self.options = options;
        if sizing_changed {
            self.rebuild_from(0);
        }
    }

    pub fn set_overscan(&mut self, overscan: usize) {
        self.options.overscan = overscan;
    }

    pub fn count(&self) -> usize {
        self.keys.len()
    }

    pub fn keys(&self) -> &[K] {
        &self.keys
    }

    pub fn key_for(&self, index: usize) -> Option<&K> {
        self.keys.get(index)
    }

    pub fn index_of(&self, key: &K) -> Option<usize> {
        self.index_of.get(key).copied()
    }

    pub fn viewport_extent(&self) -> u32 {
        self.viewport_extent
    }

    /// Sets the viewport extent. Negative extents are treated as an empty viewport.
    pub fn set_viewport_extent(&mut self, extent: i64) {
        self.viewport_extent = extent.clamp(0, u32::MAX as i64) as u32;
    }

    pub fn scroll_offset(&self) -> u64 {
        self.scroll_offset
    }

    /// Sets the scroll offset. Negative offsets (e.g. elastic overscroll) are clamped to 0.
    pub fn set_scroll_offset(&mut self, offset: i64) {
        self.scroll_offset = clamp_offset(offset);
    }

    pub fn set_scroll_offset_clamped(&mut self, offset: i64) {
        self.scroll_offset = self.clamp_scroll_offset(clamp_offset(offset));
    }

    /// Replaces the key sequence.
    ///
    /// Only the suffix starting at the first index whose key differs is rebuilt; measured sizes
    /// follow their keys. Returns that first changed index (`count()` when nothing changed).
    pub fn sync_keys(&mut self, keys: impl IntoIterator<Item = K>) -> usize {
        let next: Vec<K> = keys.into_iter().collect();
        let first_changed = self
            .keys
            .iter()
            .zip(next.iter())
            .position(|(a, b)| a != b)
            .unwrap_or_else(|| cmp::min(self.keys.len(), next.len()));

        if first_changed == self.keys.len() && first_changed == next.len() {
            return first_changed;
        }

        vtrace!(
            first_changed,
            prev_count = self.keys.len(),
            count = next.len(),
            "sync_keys"
        );
        for key in self.keys.drain(first_changed..) {
            self.index_of.remove(&key);
        }
        self.truncate_layout(first_changed);
        self.push_keys(next.into_iter().skip(first_changed));
        first_changed
    }

    /// Appends keys at the end of the list without touching existing extents.
    pub fn append_keys(&mut self, keys: impl IntoIterator<Item = K>) {
        self.push_keys(keys);
        vtrace!(count = self.keys.len(), "append_keys");
    }

    fn push_keys(&mut self, keys: impl IntoIterator<Item = K>) {
        let default_size = self.options.default_size();
        let fixed = matches!(self.options.sizing, ItemSizing::Fixed(_));
        for key in keys {
            let cached = if fixed {
                None
            } else {
                self.size_cache.get(&key).copied()
            };
            let size = cached.unwrap_or(default_size);
            self.index_of.insert(key.clone(), self.keys.len());
            self.keys.push(key);
            self.sizes.push(size);
            self.measured.push(cached.is_some());
            self.sums.push(size);
        }
    }

    fn truncate_layout(&mut self, len: usize) {
        self.sizes.truncate(len);
        self.measured.truncate(len);
        self.sums.truncate(len);
    }

    fn rebuild_from(&mut self, index: usize) {
        let keys: Vec<K> = self.keys.drain(index..).collect();
        for key in &keys {
            self.index_of.remove(key);
        }
        self.truncate_layout(index);
        self.push_keys(keys);
    }

    /// Records the measured extent of the item with `key`.
    ///
    /// Returns the scroll adjustment applied to keep the content under the viewport still: when
    /// an item that starts above the current offset changes size, the offset moves by the same
    /// delta. Fixed-size lists ignore measurements.
    pub fn measure(&mut self, key: &K, size: u32) -> Result<i64, MeasurementError> {
        let index = self.index_of(key).ok_or(MeasurementError::UnknownKey)?;
        if matches!(self.options.sizing, ItemSizing::Fixed(_)) {
            return Ok(0);
        }

        self.size_cache.insert(key.clone(), size);
        self.measured[index] = true;
        Ok(self.resize(index, size))
    }

    /// Sets the extent at `index`, shifting the scroll offset when the item starts above it.
    fn resize(&mut self, index: usize, size: u32) -> i64 {
        let cur = self.sizes[index];
        if cur == size {
            return 0;
        }

        let start = self.start_of(index);
        let delta = size as i64 - cur as i64;
        self.sizes[index] = size;
        self.sums.add(index, delta);
        vtrace!(index, size, delta, "resize");

        if start < self.scroll_offset {
            if delta > 0 {
                self.scroll_offset = self.scroll_offset.saturating_add(delta as u64);
            } else {
                self.scroll_offset = self.scroll_offset.saturating_sub(delta.unsigned_abs());
            }
            return delta;
        }
        0
    }

    /// Applies the outcome of a host measurement callback.
    ///
    /// A failed measurement is not fatal: it counts as "not measured", so the item drops any
    /// cached extent and falls back to the estimate. Returns the scroll adjustment applied.
    pub fn measure_with(&mut self, key: &K, measured: Result<u32, MeasurementError>) -> i64 {
        let _err = match measured {
            Ok(size) => match self.measure(key, size) {
                Ok(adjustment) => return adjustment,
                Err(err) => err,
            },
            Err(err) => err,
        };
        vwarn!(error = %_err, "measurement ignored, using the estimate");
        self.unmeasure(key)
    }

    fn unmeasure(&mut self, key: &K) -> i64 {
        self.size_cache.remove(key);
        let Some(index) = self.index_of(key) else {
            return 0;
        };
        if matches!(self.options.sizing, ItemSizing::Fixed(_)) {
            return 0;
        }
        self.measured[index] = false;
        self.resize(index, self.options.estimated_size)
    }

    /// Forgets the cached measurement for `key`.
    ///
    /// If the key is still in the list its extent falls back to the estimate.
    pub fn invalidate(&mut self, key: &K) {
        if self.size_cache.remove(key).is_none() {
            return;
        }
        let Some(index) = self.index_of(key) else {
            return;
        };
        let estimate = self.options.default_size();
        let cur = self.sizes[index];
        self.sizes[index] = estimate;
        self.measured[index] = false;
        self.sums.add(index, estimate as i64 - cur as i64);
    }

    /// Copies the cached measurement of `from` to `to`, e.g. when an optimistic item adopts its
    /// server-assigned key. Takes effect for `to` on the next [`Self::sync_keys`].
    pub fn copy_measurement(&mut self, from: &K, to: K) {
        if let Some(size) = self.size_cache.get(from).copied() {
            self.size_cache.insert(to, size);
        }
    }

    pub fn cached_size(&self, key: &K) -> Option<u32> {
        self.size_cache.get(key).copied()
    }

    pub fn is_measured(&self, index: usize) -> bool {
        self.measured.get(index).copied().unwrap_or(false)
    }

    pub fn reset_measurements(&mut self) {
        self.size_cache.clear();
        self.rebuild_from(0);
    }

    pub fn measurement_cache_len(&self) -> usize {
        self.size_cache.len()
    }

    /// Exports cached measurements (key → extent), e.g. to restore them in a later session.
    pub fn export_measurement_cache(&self) -> Vec<(K, u32)> {
        self.size_cache
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect()
    }

    pub fn import_measurement_cache(&mut self, entries: impl IntoIterator<Item = (K, u32)>) {
        self.size_cache.clear();
        self.size_cache.extend(entries);
        vdebug!(entries = self.size_cache.len(), "import_measurement_cache");
        self.rebuild_from(0);
    }

    pub fn total_extent(&self) -> u64 {
        match self.options.sizing {
            ItemSizing::Fixed(size) => fixed_total_extent(self.count(), size),
            ItemSizing::Measured => self.sums.total(),
        }
    }

    /// The window for the current scroll offset and viewport extent.
    pub fn range(&self) -> Option<WindowRange> {
        self.compute_range(self.scroll_offset as i64, self.viewport_extent as i64)
    }

    /// The window for an arbitrary scroll offset and viewport extent.
    ///
    /// Returns `None` for an empty list or an empty viewport.
    pub fn compute_range(&self, scroll_offset: i64, viewport_extent: i64) -> Option<WindowRange> {
        let count = self.count();
        let overscan = self.options.overscan;
        if let ItemSizing::Fixed(size) = self.options.sizing {
            return fixed_range(scroll_offset, viewport_extent, count, size, overscan);
        }
        if count == 0 || viewport_extent <= 0 {
            return None;
        }

        let last = count - 1;
        let view = viewport_extent as u64;
        let total = self.sums.total();
        let offset = clamp_offset(scroll_offset).min(total.saturating_sub(view));
        let visible_end = offset.saturating_add(view).saturating_sub(1);

        let start = self.index_at_offset_inner(offset);
        let end = self.index_at_offset_inner(visible_end).max(start);
        Some(with_overscan(
            start.min(last),
            end.min(last),
            last,
            overscan,
        ))
    }

    /// `true` when the item at `index` intersects the viewport (overscan excluded).
    pub fn is_item_visible(&self, index: usize) -> bool {
        self.range().is_some_and(|r| r.contains(index))
    }

    pub fn index_at_offset(&self, offset: u64) -> Option<usize> {
        if self.count() == 0 {
            return None;
        }
        Some(self.index_at_offset_inner(offset))
    }

    fn index_at_offset_inner(&self, offset: u64) -> usize {
        let last = self.count().saturating_sub(1);
        match self.options.sizing {
            ItemSizing::Fixed(0) => 0,
            ItemSizing::Fixed(size) => cmp::min(last as u64, offset / size as u64) as usize,
            ItemSizing::Measured => cmp::min(last, self.sums.lower_bound(offset)),
        }
    }

    fn start_of(&self, index: usize) -> u64 {
        match self.options.sizing {
            ItemSizing::Fixed(size) => (index as u64).saturating_mul(size as u64),
            ItemSizing::Measured => self.sums.prefix_sum(index),
        }
    }

    pub fn item(&self, index: usize) -> Option<ItemLayout> {
        let size = *self.sizes.get(index)?;
        Some(ItemLayout {
            index,
            start: self.start_of(index),
            size,
        })
    }

    pub fn item_start(&self, index: usize) -> Option<u64> {
        self.item(index).map(|it| it.start)
    }

    pub fn item_size(&self, index: usize) -> Option<u32> {
        self.sizes.get(index).copied()
    }

    pub fn item_end(&self, index: usize) -> Option<u64> {
        self.item(index).map(|it| it.end())
    }

    /// Calls `f` for every item of the rendered (overscan-inclusive) window, in order.
    pub fn for_each_rendered(&self, mut f: impl FnMut(ItemLayout)) {
        let Some(range) = self.range() else {
            return;
        };
        let mut start = self.start_of(range.overscan_start);
        for index in range.rendered() {
            let size = self.sizes[index];
            f(ItemLayout { index, start, size });
            start = start.saturating_add(size as u64);
        }
    }

    pub fn max_scroll_offset(&self) -> u64 {
        self.total_extent()
            .saturating_sub(self.viewport_extent as u64)
    }

    pub fn clamp_scroll_offset(&self, offset: u64) -> u64 {
        offset.min(self.max_scroll_offset())
    }

    /// Computes the (clamped) offset that brings `index` into view.
    pub fn scroll_to_index_offset(&self, index: usize, align: Align) -> u64 {
        let count = self.count();
        if count == 0 {
            return 0;
        }
        let Some(item) = self.item(index.min(count - 1)) else {
            return 0;
        };
        let view = self.viewport_extent as u64;

        let target = match align {
            Align::Start => item.start,
            Align::End => item.end().saturating_sub(view),
            Align::Center => item
                .start
                .saturating_add(item.size as u64 / 2)
                .saturating_sub(view / 2),
            Align::Auto => {
                let cur = self.scroll_offset;
                let cur_end = cur.saturating_add(view);
                if item.start >= cur && item.end() <= cur_end {
                    cur
                } else if item.start < cur {
                    item.start
                } else {
                    item.end().saturating_sub(view)
                }
            }
        };
        self.clamp_scroll_offset(target)
    }

    /// Scrolls so that `index` is in view. Returns the applied offset.
    pub fn scroll_to_index(&mut self, index: usize, align: Align) -> u64 {
        let offset = self.scroll_to_index_offset(index, align);
        self.scroll_offset = offset;
        offset
    }
}
