//! A list session built on the `lazylist` crate.
//!
//! `lazylist` holds the state machines; this crate composes them into one session and drives
//! them:
//!
//! - [`ListSession`]: virtualizer, loader and optimistic store kept in sync, with frame-throttled
//!   scrolling, scroll anchoring across view changes, and reset/dispose liveness.
//! - [`SessionHandle`]: runs the host's `fetch`/`submit` futures against a shared session on a
//!   single-threaded executor.
//!
//! This crate is intentionally framework-agnostic (no UI bindings).
#![cfg_attr(not(feature = "std"), no_std)]
#![forbid(unsafe_code)]

extern crate alloc;

#[cfg(test)]
extern crate std;

#[macro_use]
mod macros;

mod anchor;
mod controller;
mod driver;
mod options;
mod throttle;

#[cfg(test)]
mod tests;

pub use anchor::{ScrollAnchor, apply_anchor, capture_first_visible_anchor};
pub use controller::{ListSession, LoadReport};
pub use driver::{DataSource, MutationSink, SessionHandle};
pub use options::SessionOptions;
pub use throttle::FrameThrottle;
