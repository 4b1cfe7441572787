//! Error types for the reconciliation engine.
//!
//! Delta errors never reach callers of `EditorState::add_delta`; they are
//! logged and the delta is dropped. Version errors are returned from
//! `EditorStateTracker::set_version`.

use smol_str::SmolStr;
use thiserror::Error;

/// Why an incoming delta payload was rejected.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum DeltaError {
    /// Payload has no string `type` field.
    #[error("delta payload has no type tag")]
    MissingType,

    /// Payload carries a `type` this engine does not understand.
    #[error("unknown delta type: {0}")]
    UnknownType(SmolStr),

    /// Payload has a known type but the fields don't match it.
    #[error("malformed delta payload: {0}")]
    Malformed(#[source] serde_json::Error),
}

/// Failure to switch the tracker to a historical version.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum VersionError {
    /// The history collaborator failed to produce the snapshot.
    #[error("failed to fetch version {version}")]
    Fetch {
        version: u64,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The history collaborator has no such version.
    #[error("version {0} does not exist")]
    Missing(u64),
}

impl VersionError {
    pub fn fetch(version: u64, source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Fetch {
            version,
            source: source.into(),
        }
    }
}
