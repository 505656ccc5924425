use alloc::boxed::Box;
use alloc::string::{String, ToString};
use alloc::sync::Arc;
use core::error::Error;
use core::fmt;

use crate::MutationId;

/// A host-side failure, shared so that error states stay cheap to clone.
pub type HostError = Arc<dyn Error + Send + Sync + 'static>;

/// The host's `fetch(cursor)` failed. The loader moves to `Error` and can be retried.
#[derive(Clone, Debug, thiserror::Error)]
#[error("page fetch failed: {source}")]
pub struct FetchError {
    #[source]
    source: HostError,
}

impl FetchError {
    pub fn new(source: impl Into<Box<dyn Error + Send + Sync + 'static>>) -> Self {
        Self {
            source: Arc::from(source.into()),
        }
    }

    /// Builds an error from a plain message.
    pub fn msg(message: impl fmt::Display) -> Self {
        Self::new(Message::new(message))
    }

    pub fn host_error(&self) -> &HostError {
        &self.source
    }
}

/// A mutation was rejected by the host and has been rolled back.
///
/// Resubmit through `mutate` to retry; the store never retries on its own.
#[derive(Clone, Debug, thiserror::Error)]
#[error("mutation {id} rolled back: {source}")]
pub struct MutationError {
    pub id: MutationId,
    #[source]
    source: HostError,
}

impl MutationError {
    pub fn new(id: MutationId, source: impl Into<Box<dyn Error + Send + Sync + 'static>>) -> Self {
        Self {
            id,
            source: Arc::from(source.into()),
        }
    }

    pub fn host_error(&self) -> &HostError {
        &self.source
    }
}

/// A measurement that cannot be used. Treated as "not measured".
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum MeasurementError {
    #[error("measured extent is not a finite, non-negative number")]
    NotFinite,
    #[error("no item with this key is currently in the list")]
    UnknownKey,
}

impl MeasurementError {
    /// Converts a raw floating point extent (as most layout engines report it) into an integral
    /// extent, rounding up.
    pub fn check(extent: f64) -> Result<u32, Self> {
        if !extent.is_finite() || extent < 0.0 {
            return Err(Self::NotFinite);
        }
        let mut whole = extent as u64;
        if (whole as f64) < extent {
            whole = whole.saturating_add(1);
        }
        Ok(whole.min(u32::MAX as u64) as u32)
    }
}

/// A plain message error, for hosts that have nothing richer to report.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct Message(pub String);

impl Message {
    pub fn new(message: impl fmt::Display) -> Self {
        Self(message.to_string())
    }
}
