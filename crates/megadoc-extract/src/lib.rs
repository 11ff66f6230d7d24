//! File path extraction for megadoc.
//!
//! Turns free-form review text into a sorted, deduplicated list of safe
//! relative paths. Extraction never fails: candidates that do not pass
//! normalization or the path policy are dropped.

mod extractor;
mod policy;

pub use extractor::{FileExtractor, Rejection};
pub use policy::{PathPolicy, separator_depth};
