//! Core types for megadoc.
//!
//! This crate provides the configuration, error taxonomy, text decoding and
//! extraction patterns shared by the extractor, the repositories and the
//! document builder.

mod config;
mod encoding;
mod error;
pub mod global;
mod patterns;
mod record;

pub use config::{MegaDocConfig, MegaDocConfigBuilder, MegaDocConfigBuilderError};
pub use encoding::{Decoded, StreamDecoder, TextEncoding, decode_with_fallback, most_permissive};
pub use error::{MegaDocError, Result, SecurityThreat};
pub use patterns::{ExtractionPattern, FilePatterns, PatternKind};
pub use record::{CacheStats, FileRecord};
