//! Cursor-based incremental loading.
//!
//! The loader is a small state machine; it never performs I/O itself. A caller asks it whether a
//! fetch should start ([`Loader::trigger`] / [`Loader::load_more`]), receives a [`FetchTicket`]
//! carrying the cursor to fetch, runs the host's `fetch(cursor)` and hands the result back with
//! [`Loader::on_fetch_settled`].
//!
//! The `Idle -> Loading` transition happens inside the same `&mut self` call that checks the
//! state, so two triggers can never both obtain a ticket.

use alloc::vec::Vec;

use crate::{FetchError, Page, WindowRange};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoaderState<E = FetchError> {
    Idle,
    Loading,
    /// The source has no more pages. Only [`Loader::reset`] and [`Loader::refresh`] leave this state.
    Exhausted,
    /// The last fetch failed; [`Loader::retry`] returns to `Idle` with the same cursor.
    Error(E),
}

impl<E> LoaderState<E> {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted)
    }

    pub fn error(&self) -> Option<&E> {
        match self {
            Self::Error(e) => Some(e),
            _ => None,
        }
    }
}

/// Permission to run exactly one `fetch(cursor)`.
///
/// The ticket remembers the loader generation it was issued in; results presented after a
/// [`Loader::reset`] are ignored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchTicket<C> {
    generation: u64,
    page: usize,
    cursor: Option<C>,
}

impl<C> FetchTicket<C> {
    /// The cursor to pass to `fetch`. `None` requests the first page.
    pub fn cursor(&self) -> Option<&C> {
        self.cursor.as_ref()
    }

    /// Zero-based number of the page this ticket fetches.
    pub fn page(&self) -> usize {
        self.page
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// What the caller should do with a settled fetch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FetchOutcome<T, E = FetchError> {
    /// Append `items` to the confirmed collection.
    Loaded { items: Vec<T>, exhausted: bool },
    /// The fetch failed; the loader is now in `Error`.
    Failed(E),
    /// The ticket belongs to an older generation (or was already settled); nothing changed.
    Stale,
}

#[derive(Clone, Debug)]
pub struct Loader<C, E = FetchError> {
    state: LoaderState<E>,
    cursor: Option<C>,
    lookahead_threshold: usize,
    generation: u64,
    pages_loaded: usize,
}

impl<C: Clone, E: Clone> Loader<C, E> {
    pub fn new(lookahead_threshold: usize) -> Self {
        Self {
            state: LoaderState::Idle,
            cursor: None,
            lookahead_threshold,
            generation: 0,
            pages_loaded: 0,
        }
    }

    pub fn state(&self) -> &LoaderState<E> {
        &self.state
    }

    pub fn is_loading(&self) -> bool {
        self.state.is_loading()
    }

    pub fn is_exhausted(&self) -> bool {
        self.state.is_exhausted()
    }

    /// Cursor the next fetch will resume from (`None` before the first page).
    pub fn cursor(&self) -> Option<&C> {
        self.cursor.as_ref()
    }

    pub fn pages_loaded(&self) -> usize {
        self.pages_loaded
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn lookahead_threshold(&self) -> usize {
        self.lookahead_threshold
    }

    pub fn set_lookahead_threshold(&mut self, lookahead_threshold: usize) {
        self.lookahead_threshold = lookahead_threshold;
    }

    /// `true` iff the loader is idle, the list is non-empty and the rendered window reaches into
    /// the last `lookahead_threshold` loaded items.
    pub fn should_fetch(&self, range: Option<&WindowRange>, item_count: usize) -> bool {
        if !self.state.is_idle() || item_count == 0 {
            return false;
        }
        range.is_some_and(|r| {
            r.overscan_end >= item_count.saturating_sub(self.lookahead_threshold)
        })
    }

    /// Checks proximity and, when a fetch is due, moves to `Loading` and returns its ticket.
    pub fn trigger(
        &mut self,
        range: Option<&WindowRange>,
        item_count: usize,
    ) -> Option<FetchTicket<C>> {
        if !self.should_fetch(range, item_count) {
            return None;
        }
        self.load_more()
    }

    /// Starts a fetch regardless of scroll position (initial load, "load more" buttons).
    ///
    /// Returns `None` unless the loader is `Idle`.
    pub fn load_more(&mut self) -> Option<FetchTicket<C>> {
        if !self.state.is_idle() {
            return None;
        }
        self.state = LoaderState::Loading;
        vdebug!(
            generation = self.generation,
            page = self.pages_loaded,
            "loader: Idle -> Loading"
        );
        Some(FetchTicket {
            generation: self.generation,
            page: self.pages_loaded,
            cursor: self.cursor.clone(),
        })
    }

    /// Applies the result of the fetch started with `ticket`.
    pub fn on_fetch_settled<T>(
        &mut self,
        ticket: &FetchTicket<C>,
        result: Result<Page<T, C>, E>,
    ) -> FetchOutcome<T, E> {
        if ticket.generation != self.generation || !self.state.is_loading() {
            vdebug!(
                ticket_generation = ticket.generation,
                generation = self.generation,
                "loader: dropping stale fetch result"
            );
            return FetchOutcome::Stale;
        }

        match result {
            Ok(page) => {
                let exhausted = page.is_last();
                self.pages_loaded += 1;
                self.cursor = page.cursor;
                self.state = if exhausted {
                    LoaderState::Exhausted
                } else {
                    LoaderState::Idle
                };
                vdebug!(
                    items = page.items.len(),
                    exhausted,
                    pages_loaded = self.pages_loaded,
                    "loader: page loaded"
                );
                FetchOutcome::Loaded {
                    items: page.items,
                    exhausted,
                }
            }
            Err(err) => {
                vdebug!(page = ticket.page, "loader: Loading -> Error");
                self.state = LoaderState::Error(err.clone());
                FetchOutcome::Failed(err)
            }
        }
    }

    /// Leaves `Error` for `Idle`, keeping the cursor so the same page is fetched again.
    ///
    /// Returns `false` when the loader was not in `Error`.
    pub fn retry(&mut self) -> bool {
        if self.state.error().is_none() {
            return false;
        }
        self.state = LoaderState::Idle;
        vdebug!("loader: Error -> Idle (retry)");
        true
    }

    /// Returns to the initial state (no cursor, nothing loaded).
    ///
    /// Any fetch still in flight belongs to the previous generation and its result will be
    /// reported as [`FetchOutcome::Stale`].
    pub fn reset(&mut self) {
        self.state = LoaderState::Idle;
        self.cursor = None;
        self.pages_loaded = 0;
        self.generation = self.generation.wrapping_add(1);
        vdebug!(generation = self.generation, "loader: reset");
    }

    /// Starts over from the first page while the caller keeps showing its current items.
    ///
    /// A fetch still in flight becomes stale, as with [`Self::reset`]. The returned ticket
    /// fetches page 0; its items replace the caller's items instead of being appended.
    pub fn refresh(&mut self) -> FetchTicket<C> {
        self.reset();
        self.state = LoaderState::Loading;
        FetchTicket {
            generation: self.generation,
            page: 0,
            cursor: None,
        }
    }
}
