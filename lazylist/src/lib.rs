//! Headless building blocks for very large, incrementally loaded, optimistically edited lists.
//!
//! For a composed list session (scroll throttling, anchoring, an async driver), see the
//! `lazylist-session` crate.
//!
//! This crate holds the state machines and the math, never any UI or I/O:
//! - [`Virtualizer`]: which indexes to render for a scroll offset and viewport, backed by prefix
//!   sums over measured or estimated extents.
//! - [`Loader`]: cursor pagination triggered when the rendered window nears the loaded tail, with
//!   at most one fetch in flight.
//! - [`OptimisticStore`]: speculative add/update/remove with per-mutation reconciliation and
//!   rollback.
//!
//! A host supplies `fetch(cursor)`, `submit(op)` and (optionally) item measurements.
#![cfg_attr(not(feature = "std"), no_std)]
#![forbid(unsafe_code)]

extern crate alloc;

#[cfg(test)]
extern crate std;

#[macro_use]
mod macros;

mod error;
mod fenwick;
mod key;
mod loader;
mod optimistic;
mod options;
mod types;
mod virtualizer;


pub use error::{FetchError, HostError, MeasurementError, Message, MutationError};
pub use key::ItemKey;
pub use loader::{FetchOutcome, FetchTicket, Loader, LoaderState};
pub use optimistic::{
    ConflictPolicy, KeyOf, Mutation, MutationId, MutationKind, MutationOp, MutationStatus,
    OptimisticStore, PendingMutation, Rekey, Resolution,
};
pub use options::ListOptions;
pub use types::{Align, ItemLayout, ItemSizing, Page, WindowRange};
pub use virtualizer::{Virtualizer, fixed_range, fixed_total_extent};
