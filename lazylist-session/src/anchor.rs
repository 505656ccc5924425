use core::fmt;

use lazylist::{ItemKey, Virtualizer};

/// A scroll anchor that can be used to preserve visual position across view changes.
///
/// Typical use cases:
/// - an optimistic insert or removal above the viewport
/// - a committed `Add` whose item moves when it adopts its server key
#[derive(Clone, PartialEq, Eq)]
pub struct ScrollAnchor<K> {
    pub key: K,
    /// The distance from the anchor item's start to the viewport's scroll offset.
    pub offset_in_viewport: u64,
}

impl<K: fmt::Debug> fmt::Debug for ScrollAnchor<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScrollAnchor")
            .field("key", &self.key)
            .field("offset_in_viewport", &self.offset_in_viewport)
            .finish()
    }
}

/// Captures an anchor for the first visible item (by key).
///
/// Returns `None` if the list or the viewport is empty.
pub fn capture_first_visible_anchor<K: ItemKey>(v: &Virtualizer<K>) -> Option<ScrollAnchor<K>> {
    let range = v.range()?;
    let index = range.start_index;
    let start = v.item_start(index)?;
    let key = v.key_for(index)?.clone();
    let offset_in_viewport = v.scroll_offset().saturating_sub(start);
    Some(ScrollAnchor {
        key,
        offset_in_viewport,
    })
}

/// Applies a previously captured anchor by adjusting the scroll offset.
///
/// Returns `false` when the anchor item is no longer in the list; the offset is then left as is.
pub fn apply_anchor<K: ItemKey>(v: &mut Virtualizer<K>, anchor: &ScrollAnchor<K>) -> bool {
    let Some(index) = v.index_of(&anchor.key) else {
        return false;
    };
    let Some(start) = v.item_start(index) else {
        return false;
    };
    let target = start.saturating_add(anchor.offset_in_viewport);
    v.set_scroll_offset_clamped(target.min(i64::MAX as u64) as i64);
    true
}
