//! coedit-core: delta-log reconciliation for co-edited text buffers.
//!
//! This crate provides:
//! - `BufferHost` trait for the text buffer collaborator, with anchors
//! - `RopeBuffer` - ropey-backed implementation
//! - `EditorState<H>` - one buffer's timestamp-ordered delta log
//! - `EditorStateTracker` - all buffers plus version time-travel
//! - `FuzzySet` - title lookup for free-text file references

pub mod cursors;
pub mod delta;
pub mod error;
pub mod events;
pub mod fuzzy;
pub mod palette;
pub mod state;
pub mod text;
pub mod tracker;
pub mod types;
pub mod version;

pub use cursors::{RemoteCursor, RemoteCursorMarker};
pub use delta::{
    BufferMeta, Change, DELTA_TYPES, Delta, DeltaKind, SerializedChange, SerializedDelta,
    SerializedDeltaKind,
};
pub use error::{DeltaError, VersionError};
pub use events::{ChannelEvent, CursorChange, CursorEvent};
pub use fuzzy::{FileReference, FuzzyConfig, FuzzySet, parse_file_reference};
pub use palette::Palette;
pub use smol_str::SmolStr;
pub use state::{EditorState, SerializedEditorState};
pub use text::{AnchorId, BufferHost, RopeBuffer};
pub use tracker::{EditorStateTracker, HostProvider, TrackerEvent};
pub use types::{
    ChatUser, CursorId, EditorId, Role, TextRange, Timestamp, Version, VersionContext,
};
pub use version::{
    EditorSnapshot, MemoryVersionSource, VersionCache, VersionSnapshot, VersionSource,
};
