//! An async driver for [`ListSession`].
//!
//! Host I/O is modelled by two traits returning local (non-`Send`) futures, matching a
//! single-threaded event loop. [`SessionHandle`] shares the session behind `Rc<RefCell<_>>` and
//! never holds the borrow across an `.await`, so concurrent tasks only interleave at await points
//! and every session transition stays atomic.

use alloc::boxed::Box;
use alloc::rc::Rc;
use core::cell::{Ref, RefCell, RefMut};
use core::error::Error;

use futures::future::{self, LocalBoxFuture};
use lazylist::{FetchError, FetchTicket, ItemKey, Mutation, MutationOp, Page, Resolution};

use crate::{ListSession, LoadReport};

/// The host's paginated data source.
///
/// `fetch` must be idempotent for a given cursor: a failed page is fetched again with the same
/// cursor on retry.
pub trait DataSource<T, C> {
    type Error;

    /// Fetches the page after `cursor` (`None` for the first page).
    fn fetch(&self, cursor: Option<C>) -> LocalBoxFuture<'_, Result<Page<T, C>, Self::Error>>;
}

/// The host's mutation endpoint.
pub trait MutationSink<T, K> {
    type Error: Into<Box<dyn Error + Send + Sync + 'static>>;

    /// Submits `op` and resolves to the canonical server representation of the affected item
    /// (including its real key for an `Add`).
    fn submit(&self, op: MutationOp<T, K>) -> LocalBoxFuture<'_, Result<T, Self::Error>>;
}

/// A cloneable handle to a session shared by the tasks of one event loop.
pub struct SessionHandle<T, K, C, E = FetchError> {
    inner: Rc<RefCell<ListSession<T, K, C, E>>>,
}

impl<T, K, C, E> Clone for SessionHandle<T, K, C, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T, K, C, E> core::fmt::Debug for SessionHandle<T, K, C, E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("handles", &Rc::strong_count(&self.inner))
            .finish_non_exhaustive()
    }
}

impl<T: Clone, K: ItemKey, C: Clone, E: Clone> SessionHandle<T, K, C, E> {
    pub fn new(session: ListSession<T, K, C, E>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(session)),
        }
    }

    /// Borrows the session. Do not hold the guard across an `.await`.
    pub fn session(&self) -> Ref<'_, ListSession<T, K, C, E>> {
        self.inner.borrow()
    }

    /// Mutably borrows the session. Do not hold the guard across an `.await`.
    pub fn session_mut(&self) -> RefMut<'_, ListSession<T, K, C, E>> {
        self.inner.borrow_mut()
    }

    /// Loads the first page, then keeps loading while the rendered window reaches the tail.
    pub async fn load_initial<S>(&self, source: &S) -> Option<LoadReport<E>>
    where
        S: DataSource<T, C, Error = E>,
    {
        let ticket = self.inner.borrow_mut().load_initial();
        self.run_fetches(ticket, source).await
    }

    pub async fn load_more<S>(&self, source: &S) -> Option<LoadReport<E>>
    where
        S: DataSource<T, C, Error = E>,
    {
        let ticket = self.inner.borrow_mut().load_more();
        self.run_fetches(ticket, source).await
    }

    /// Reloads the first page, keeping the current items until it arrives.
    pub async fn refresh<S>(&self, source: &S) -> Option<LoadReport<E>>
    where
        S: DataSource<T, C, Error = E>,
    {
        let ticket = self.inner.borrow_mut().refresh();
        self.run_fetches(ticket, source).await
    }

    pub async fn retry<S>(&self, source: &S) -> Option<LoadReport<E>>
    where
        S: DataSource<T, C, Error = E>,
    {
        let ticket = self.inner.borrow_mut().retry();
        self.run_fetches(ticket, source).await
    }

    /// Reports a scroll offset and runs the fetch it triggers, if any.
    pub async fn scroll<S>(&self, offset: i64, now_ms: u64, source: &S) -> Option<LoadReport<E>>
    where
        S: DataSource<T, C, Error = E>,
    {
        let ticket = self.inner.borrow_mut().on_scroll(offset, now_ms);
        self.run_fetches(ticket, source).await
    }

    /// Applies a deferred scroll offset and runs the fetch it triggers, if any.
    pub async fn tick<S>(&self, now_ms: u64, source: &S) -> Option<LoadReport<E>>
    where
        S: DataSource<T, C, Error = E>,
    {
        let ticket = self.inner.borrow_mut().tick(now_ms);
        self.run_fetches(ticket, source).await
    }

    pub async fn resize<S>(&self, extent: i64, source: &S) -> Option<LoadReport<E>>
    where
        S: DataSource<T, C, Error = E>,
    {
        let ticket = self.inner.borrow_mut().on_viewport(extent);
        self.run_fetches(ticket, source).await
    }

    /// Applies `mutation` optimistically, submits it and settles it with the host's answer.
    ///
    /// When the view shrinks enough for the loaded tail to come into view, the next page is
    /// fetched from `source` while the submission is in flight. Returns `None` when the session
    /// is disposed.
    pub async fn mutate<S, D>(
        &self,
        sink: &S,
        source: &D,
        mutation: Mutation<T, K>,
    ) -> Option<Resolution<K>>
    where
        S: MutationSink<T, K>,
        D: DataSource<T, C, Error = E>,
    {
        let (op, fill) = {
            let mut session = self.inner.borrow_mut();
            let op = session.mutate(mutation)?;
            (op, session.trigger())
        };
        let id = op.id;
        let settle = async {
            let result = sink.submit(op).await;
            let mut session = self.inner.borrow_mut();
            let resolution = session.resolve_mutation(id, result);
            (resolution, session.trigger())
        };
        let ((resolution, refill), _) = future::join(settle, self.run_fetches(fill, source)).await;
        self.run_fetches(refill, source).await;
        Some(resolution)
    }

    /// Runs `first`, then any fetch the grown list triggers, until the window is filled, the
    /// source is exhausted or a fetch fails. Returns the report of the last fetch.
    async fn run_fetches<S>(
        &self,
        first: Option<FetchTicket<C>>,
        source: &S,
    ) -> Option<LoadReport<E>>
    where
        S: DataSource<T, C, Error = E>,
    {
        let mut ticket = first?;
        loop {
            vtrace!(page = ticket.page(), "fetch started");
            let result = source.fetch(ticket.cursor().cloned()).await;

            let (report, next) = {
                let mut session = self.inner.borrow_mut();
                let report = session.apply_fetch(&ticket, result);
                let next = match report {
                    LoadReport::Appended { .. } => session.trigger(),
                    LoadReport::Failed(_) | LoadReport::Stale => None,
                };
                (report, next)
            };

            match next {
                Some(next) => ticket = next,
                None => return Some(report),
            }
        }
    }
}
