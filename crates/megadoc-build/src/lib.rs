//! Mega document assembly.
//!
//! The [`DocumentBuilder`] reads a review, extracts the referenced files,
//! reads each one through a repository and renders a single Markdown
//! document. [`MegaDocumentService`] wires the pieces together for callers.

mod builder;
mod render;
mod service;
mod stats;

pub use builder::{BuildOptions, DocumentBuilder};
pub use render::{DocumentHeader, RenderedFile, code_fence, render_document};
pub use service::{MegaDocumentService, SystemInfo};
pub use stats::{BuildStats, FileFailure};
