//! Ambient plumbing shared by coedit binaries: configuration, logging and
//! diagnostics.

pub mod config;
pub mod error;
pub mod telemetry;

pub use crate::config::{EngineConfig, FileStore, Loader, Saver};
pub use crate::error::{CoeditError, ParseError};
