use alloc::boxed::Box;
use alloc::vec::Vec;
use core::error::Error;

use lazylist::{
    Align, FetchError, FetchOutcome, FetchTicket, ItemKey, ItemLayout, Loader, LoaderState,
    MeasurementError, Mutation, MutationId, MutationKind, MutationOp, MutationStatus,
    OptimisticStore, Page, Resolution, Virtualizer, WindowRange,
};

use crate::{FrameThrottle, SessionOptions, apply_anchor, capture_first_visible_anchor};

/// What happened to the session when a fetch settled.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoadReport<E = FetchError> {
    /// The page was added to the confirmed items: appended, or replacing them for the first
    /// page. `appended` excludes duplicate keys.
    Appended { appended: usize, exhausted: bool },
    Failed(E),
    /// The fetch was issued before a reset (or the session is disposed); nothing changed.
    Stale,
}

/// A list session: one virtualizer, one loader and one optimistic store kept in sync.
///
/// The session never performs I/O. Entry points that may start a fetch return a
/// [`FetchTicket`]; run the host's `fetch(ticket.cursor())` and hand the result to
/// [`Self::apply_fetch`]. Mutations work the same way with [`Self::mutate`] and
/// [`Self::resolve_mutation`]. [`crate::SessionHandle`] automates both for async hosts.
///
/// Adapters drive it by calling:
/// - `on_viewport` / `on_scroll` when UI events occur
/// - `tick(now_ms)` each frame, to apply scroll offsets deferred by the frame throttle
/// - `measure` after an item has been laid out
/// - `trigger` after mutating, since removals can bring the loaded tail into view
pub struct ListSession<T, K, C, E = FetchError> {
    options: SessionOptions,
    virtualizer: Virtualizer<K>,
    loader: Loader<C, E>,
    store: OptimisticStore<T, K>,
    throttle: FrameThrottle,
    disposed: bool,
}

impl<T: Clone, K: ItemKey, C, E> core::fmt::Debug for ListSession<T, K, C, E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ListSession")
            .field("options", &self.options)
            .field("count", &self.store.view().len())
            .field("disposed", &self.disposed)
            .finish_non_exhaustive()
    }
}

impl<T: Clone, K: ItemKey, C: Clone, E: Clone> ListSession<T, K, C, E> {
    pub fn new(options: SessionOptions, key_of: impl Fn(&T) -> K + Send + Sync + 'static) -> Self {
        vdebug!(
            frame_interval_ms = options.frame_interval_ms,
            preserve_anchor = options.preserve_anchor,
            "ListSession::new"
        );
        Self {
            options,
            virtualizer: Virtualizer::new(options.list),
            loader: Loader::new(options.list.lookahead_threshold),
            store: OptimisticStore::new(key_of, options.list.conflict_policy),
            throttle: FrameThrottle::new(options.frame_interval_ms),
            disposed: false,
        }
    }

    /// Moves an updated value onto a server-assigned key; see [`OptimisticStore::set_rekey`].
    pub fn with_rekey(mut self, rekey: impl Fn(&T, &K) -> T + Send + Sync + 'static) -> Self {
        self.store.set_rekey(rekey);
        self
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Applies new options to every part of the session.
    ///
    /// Changing the sizing rebuilds all extents (measurements are kept); the first visible item
    /// stays still when anchoring is enabled. Returns a ticket when the new window or lookahead
    /// threshold makes a fetch due.
    pub fn set_options(&mut self, options: SessionOptions) -> Option<FetchTicket<C>> {
        if self.disposed {
            return None;
        }
        let anchor = if options.preserve_anchor {
            capture_first_visible_anchor(&self.virtualizer)
        } else {
            None
        };
        self.options = options;
        self.virtualizer.set_options(options.list);
        self.loader
            .set_lookahead_threshold(options.list.lookahead_threshold);
        self.store.set_policy(options.list.conflict_policy);
        self.throttle.set_interval_ms(options.frame_interval_ms);
        if let Some(anchor) = anchor {
            apply_anchor(&mut self.virtualizer, &anchor);
        }
        vdebug!(
            overscan = options.list.overscan,
            lookahead_threshold = options.list.lookahead_threshold,
            "session options changed"
        );
        self.trigger()
    }

    pub fn virtualizer(&self) -> &Virtualizer<K> {
        &self.virtualizer
    }

    pub fn loader(&self) -> &Loader<C, E> {
        &self.loader
    }

    pub fn store(&self) -> &OptimisticStore<T, K> {
        &self.store
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Liveness token; bumped by every reset.
    pub fn generation(&self) -> u64 {
        self.loader.generation()
    }

    /// The whole merged collection (confirmed items with pending mutations applied).
    pub fn view(&self) -> &[T] {
        self.store.view()
    }

    /// The slice of the view the UI must render (overscan included).
    pub fn items(&self) -> &[T] {
        let view = self.store.view();
        match self.virtualizer.range() {
            Some(range) => view.get(range.rendered()).unwrap_or(&[]),
            None => &[],
        }
    }

    /// Rendered items with their layout along the scroll axis.
    pub fn rendered(&self) -> impl Iterator<Item = (ItemLayout, &T)> + '_ {
        let view = self.store.view();
        self.virtualizer
            .range()
            .into_iter()
            .flat_map(|range| range.rendered())
            .filter_map(move |index| Some((self.virtualizer.item(index)?, view.get(index)?)))
    }

    pub fn range(&self) -> Option<WindowRange> {
        self.virtualizer.range()
    }

    pub fn loader_state(&self) -> &LoaderState<E> {
        self.loader.state()
    }

    pub fn total_extent(&self) -> u64 {
        self.virtualizer.total_extent()
    }

    pub fn scroll_offset(&self) -> u64 {
        self.virtualizer.scroll_offset()
    }

    pub fn on_viewport(&mut self, extent: i64) -> Option<FetchTicket<C>> {
        if self.disposed {
            return None;
        }
        self.virtualizer.set_viewport_extent(extent);
        self.trigger()
    }

    /// Reports a scroll offset from the UI.
    ///
    /// At most one offset is applied per frame; offsets arriving faster are deferred until
    /// [`Self::tick`]. Returns a ticket when the new window reaches the loaded tail.
    pub fn on_scroll(&mut self, offset: i64, now_ms: u64) -> Option<FetchTicket<C>> {
        if self.disposed {
            return None;
        }
        let offset = self.throttle.offer(offset, now_ms)?;
        self.apply_scroll(offset);
        self.trigger()
    }

    /// Applies the scroll offset deferred by the frame throttle, if its frame has elapsed.
    pub fn tick(&mut self, now_ms: u64) -> Option<FetchTicket<C>> {
        if self.disposed {
            return None;
        }
        let offset = self.throttle.flush(now_ms)?;
        self.apply_scroll(offset);
        self.trigger()
    }

    fn apply_scroll(&mut self, offset: i64) {
        self.virtualizer.set_scroll_offset(offset);
        vtrace!(offset, range = ?self.virtualizer.range(), "scroll applied");
    }

    /// Starts a fetch if the rendered window reaches into the loaded tail.
    pub fn trigger(&mut self) -> Option<FetchTicket<C>> {
        if self.disposed {
            return None;
        }
        let range = self.virtualizer.range();
        self.loader.trigger(range.as_ref(), self.store.view().len())
    }

    /// Requests the first page. Returns `None` once a page has been loaded.
    pub fn load_initial(&mut self) -> Option<FetchTicket<C>> {
        if self.disposed || self.loader.pages_loaded() > 0 {
            return None;
        }
        self.loader.load_more()
    }

    /// Starts a fetch regardless of the scroll position.
    pub fn load_more(&mut self) -> Option<FetchTicket<C>> {
        if self.disposed {
            return None;
        }
        self.loader.load_more()
    }

    /// Leaves the loader's `Error` state and refetches the failed page.
    pub fn retry(&mut self) -> Option<FetchTicket<C>> {
        if self.disposed || !self.loader.retry() {
            return None;
        }
        self.loader.load_more()
    }

    /// Reloads the first page while the current items stay on screen.
    ///
    /// When the page arrives it replaces the confirmed items; pending mutations stay on top and
    /// measurements are kept. Any fetch in flight becomes stale.
    pub fn refresh(&mut self) -> Option<FetchTicket<C>> {
        if self.disposed {
            return None;
        }
        let ticket = self.loader.refresh();
        vdebug!(generation = ticket.generation(), "refresh started");
        Some(ticket)
    }

    /// Applies the result of the fetch started with `ticket`.
    ///
    /// A first-page result (initial load or [`Self::refresh`]) replaces the confirmed items; any
    /// other page is appended.
    pub fn apply_fetch(
        &mut self,
        ticket: &FetchTicket<C>,
        result: Result<Page<T, C>, E>,
    ) -> LoadReport<E> {
        if self.disposed {
            vdebug!("apply_fetch: session disposed, dropping result");
            return LoadReport::Stale;
        }
        match self.loader.on_fetch_settled(ticket, result) {
            FetchOutcome::Loaded { items, exhausted } if ticket.page() == 0 => {
                let appended = self.update_view(|store| store.replace_confirmed(items));
                let offset = self.virtualizer.scroll_offset();
                self.virtualizer
                    .set_scroll_offset_clamped(i64::try_from(offset).unwrap_or(i64::MAX));
                vdebug!(appended, exhausted, "first page loaded");
                LoadReport::Appended {
                    appended,
                    exhausted,
                }
            }
            FetchOutcome::Loaded { items, exhausted } => {
                let appended = self.update_view(|store| store.append_confirmed(items));
                vdebug!(appended, exhausted, "page appended");
                LoadReport::Appended {
                    appended,
                    exhausted,
                }
            }
            FetchOutcome::Failed(err) => LoadReport::Failed(err),
            FetchOutcome::Stale => LoadReport::Stale,
        }
    }

    /// Applies `mutation` to the view immediately. The returned op goes to the host's `submit`.
    ///
    /// Follow up with [`Self::trigger`]: a removal can bring the loaded tail into view.
    pub fn mutate(&mut self, mutation: Mutation<T, K>) -> Option<MutationOp<T, K>> {
        if self.disposed {
            return None;
        }
        Some(self.update_view(|store| store.mutate(mutation)))
    }

    /// Settles a mutation with the host's answer (the canonical item, or an error).
    pub fn resolve_mutation<F>(&mut self, id: MutationId, result: Result<T, F>) -> Resolution<K>
    where
        F: Into<Box<dyn Error + Send + Sync + 'static>>,
    {
        if self.disposed {
            return Resolution::Ignored;
        }
        let temp_key = self.pending_add_key(id);
        if let (Some(temp), Ok(canonical)) = (&temp_key, &result) {
            let key = self.store.key_of(canonical);
            if key != *temp {
                self.virtualizer.copy_measurement(temp, key);
            }
        }

        let resolution = self.update_view(|store| store.resolve(id, result));
        self.forget_measurements(&resolution, temp_key.as_ref());
        resolution
    }

    /// Commits a mutation with its optimistic value, for hosts whose `submit` returns no body.
    pub fn commit_mutation(&mut self, id: MutationId) -> Resolution<K> {
        if self.disposed {
            return Resolution::Ignored;
        }
        let resolution = self.update_view(|store| store.commit_as_submitted(id));
        self.forget_measurements(&resolution, None);
        resolution
    }

    fn pending_add_key(&self, id: MutationId) -> Option<K> {
        self.store
            .pending()
            .find(|m| m.id == id && m.kind == MutationKind::Add)
            .filter(|m| m.status == MutationStatus::Pending)
            .map(|m| m.key.clone())
    }

    /// Rolls back every mutation still waiting for the server. Confirmed items are kept.
    ///
    /// Returns the ids dropped; their late results are ignored.
    pub fn rollback_all(&mut self) -> Vec<MutationId> {
        if self.disposed {
            return Vec::new();
        }
        let temp_keys: Vec<K> = self
            .store
            .pending()
            .filter(|m| m.kind == MutationKind::Add && m.status == MutationStatus::Pending)
            .map(|m| m.key.clone())
            .collect();
        let ids = self.update_view(|store| store.rollback_all());
        for temp in &temp_keys {
            self.forget_temp_key(temp);
        }
        ids
    }

    fn forget_measurements(&mut self, resolution: &Resolution<K>, temp_key: Option<&K>) {
        match resolution {
            Resolution::Committed {
                kind: MutationKind::Remove,
                key,
                ..
            } => self.virtualizer.invalidate(key),
            Resolution::RolledBack(_err) => {
                vwarn!(error = %_err, "mutation rolled back");
            }
            _ => {}
        }
        if let Some(temp) = temp_key {
            self.forget_temp_key(temp);
        }
    }

    /// Drops the measurement of a temporary key once no item in the view uses it.
    fn forget_temp_key(&mut self, temp: &K) {
        if self.store.view_index_of(temp).is_none() {
            self.virtualizer.invalidate(temp);
        }
    }

    /// Forwards a host measurement. Returns the scroll adjustment applied.
    pub fn measure(&mut self, key: &K, measured: Result<u32, MeasurementError>) -> i64 {
        if self.disposed {
            return 0;
        }
        self.virtualizer.measure_with(key, measured)
    }

    /// Computes and applies a scroll-to-index immediately.
    ///
    /// Returns the applied (clamped) offset.
    pub fn scroll_to_index(&mut self, index: usize, align: Align) -> u64 {
        if self.disposed {
            return self.virtualizer.scroll_offset();
        }
        self.virtualizer.scroll_to_index(index, align)
    }

    /// Drops every loaded item and in-flight operation and starts over from the first page.
    ///
    /// Measurements are kept. Results of fetches and mutations issued before the reset are
    /// ignored when they arrive.
    pub fn reset(&mut self) {
        self.loader.reset();
        self.store.clear();
        self.throttle.reset();
        self.sync_view();
        self.virtualizer.set_scroll_offset(0);
        vdebug!(generation = self.loader.generation(), "session reset");
    }

    /// Tears the session down. Every entry point becomes a no-op.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.reset();
        self.disposed = true;
        vdebug!("session disposed");
    }

    /// Runs `f` on the store, then re-syncs the virtualizer, keeping the first visible item
    /// still when anchoring is enabled.
    fn update_view<R>(&mut self, f: impl FnOnce(&mut OptimisticStore<T, K>) -> R) -> R {
        let anchor = if self.options.preserve_anchor {
            capture_first_visible_anchor(&self.virtualizer)
        } else {
            None
        };
        let out = f(&mut self.store);
        self.sync_view();
        if let Some(anchor) = anchor {
            if !apply_anchor(&mut self.virtualizer, &anchor) {
                vtrace!("anchor item left the view");
            }
        }
        out
    }

    fn sync_view(&mut self) {
        let store = &self.store;
        let _first_changed = self
            .virtualizer
            .sync_keys(store.view().iter().map(|item| store.key_of(item)));
        vtrace!(
            first_changed = _first_changed,
            count = self.virtualizer.count(),
            "view synced"
        );
    }
}
