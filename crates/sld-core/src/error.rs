//! Unified error types for the single-line diagram crates
//!
//! [`SldError`] covers everything that can make a layout run fail outright:
//! misuse of the construction interface, missing position data and
//! topologies the layout does not know how to draw. Degradations that still
//! produce a layout (disconnected graph, undefined blocks, ordering
//! inconsistencies) are not errors; they are recorded in
//! [`Diagnostics`](crate::diagnostics::Diagnostics).
//!
//! # Example
//!
//! ```ignore
//! use sld_core::{SldError, SldResult};
//!
//! fn build(builder: GraphBuilder) -> SldResult<Graph> {
//!     let mut diag = Diagnostics::new();
//!     let graph = builder.build(&mut diag)?;
//!     Ok(graph)
//! }
//! ```

use thiserror::Error;

/// Error type shared by graph construction and the layout pipeline.
#[derive(Error, Debug)]
pub enum SldError {
    /// I/O errors (reading or writing parameter files)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors (malformed parameter files, bad options)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Construction errors (unknown node, duplicate id, wrong node kind)
    #[error("Graph error: {0}")]
    Graph(String),

    /// Position data missing or inconsistent
    #[error("Layout error: {0}")]
    Layout(String),

    /// Topology shape the layout does not handle
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Generic errors (for wrapping external errors)
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Results using SldError.
pub type SldResult<T> = Result<T, SldError>;

impl From<anyhow::Error> for SldError {
    fn from(err: anyhow::Error) -> Self {
        SldError::Other(err.to_string())
    }
}

impl From<String> for SldError {
    fn from(s: String) -> Self {
        SldError::Other(s)
    }
}

impl From<&str> for SldError {
    fn from(s: &str) -> Self {
        SldError::Other(s.to_string())
    }
}

impl From<toml::de::Error> for SldError {
    fn from(err: toml::de::Error) -> Self {
        SldError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for SldError {
    fn from(err: toml::ser::Error) -> Self {
        SldError::Config(err.to_string())
    }
}
