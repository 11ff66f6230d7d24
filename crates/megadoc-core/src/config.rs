//! Extraction and security policy configuration.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::OnceLock;

use derive_builder::Builder;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::encoding::{TextEncoding, most_permissive};
use crate::error::{MegaDocError, Result};
use crate::patterns::FilePatterns;

const DEFAULT_EXTENSIONS: &[&str] = &[
    // C/C++
    "hpp", "cpp", "h", "c", "cc", "cxx",
    // Python
    "py", "pyx", "pyi",
    // JavaScript/TypeScript
    "js", "ts", "jsx", "tsx",
    // JVM, Rust, Go
    "java", "kt", "rs", "go",
    // Documentation
    "md", "txt", "rst",
    // Config and data
    "cmake", "yml", "yaml", "json", "xml", "toml", "ini", "cfg", "csv", "sql",
    // Web
    "html", "css",
];

const DEFAULT_SPECIAL_FILENAMES: &[&str] = &[
    "CMakeLists.txt",
    "Makefile",
    "Dockerfile",
    "README",
    "LICENSE",
    "Justfile",
    "Rakefile",
    "Gemfile",
];

fn default_extensions() -> BTreeSet<String> {
    DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect()
}

fn default_special_filenames() -> BTreeSet<String> {
    DEFAULT_SPECIAL_FILENAMES.iter().map(|e| e.to_string()).collect()
}

fn default_fallback_encodings() -> Vec<TextEncoding> {
    vec![
        TextEncoding::Utf8,
        TextEncoding::Latin1,
        TextEncoding::Cp1252,
        TextEncoding::Utf16,
    ]
}

/// Policy for extracting, validating and reading referenced files.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
#[serde(default)]
pub struct MegaDocConfig {
    /// Allowed extensions, lowercase and without the dot.
    #[builder(default = "default_extensions()")]
    supported_extensions: BTreeSet<String>,

    /// Basenames accepted even without an allowed extension.
    #[builder(default = "default_special_filenames()")]
    pub special_filenames: BTreeSet<String>,

    /// Files listed in summaries before truncating.
    #[builder(default = "10")]
    pub max_preview_files: usize,

    /// Failures listed in summaries before truncating.
    #[builder(default = "5")]
    pub max_error_preview: usize,

    /// Read size ceiling in megabytes. Negative values reject every file.
    #[builder(default = "100.0")]
    pub max_file_size_mb: f64,

    /// First encoding tried when decoding a file.
    #[builder(default = "TextEncoding::Utf8")]
    pub default_encoding: TextEncoding,

    /// Encodings tried in order after the default one fails.
    #[builder(default = "default_fallback_encodings()")]
    pub fallback_encodings: Vec<TextEncoding>,

    /// Bytes per chunk for streaming reads.
    #[builder(default = "8192")]
    pub chunk_size: usize,

    /// Allow paths that resolve outside the base directory.
    #[builder(default = "false")]
    pub allow_path_traversal: bool,

    /// Maximum number of separators in an accepted path.
    #[builder(default = "10")]
    pub max_depth_levels: usize,

    /// Cache file records in the repository.
    #[builder(default = "true")]
    pub enable_caching: bool,

    /// Capacity of the repository cache.
    #[builder(default = "128")]
    pub cache_size: usize,

    #[builder(setter(skip))]
    #[serde(skip)]
    patterns: OnceLock<FilePatterns>,
}

impl MegaDocConfigBuilder {
    fn validate(&self) -> std::result::Result<(), String> {
        if self.chunk_size == Some(0) {
            return Err("chunk_size must be greater than zero".to_string());
        }
        if self.enable_caching.unwrap_or(true) && self.cache_size == Some(0) {
            return Err("cache_size must be greater than zero when caching is enabled".to_string());
        }
        if self.max_file_size_mb.is_some_and(f64::is_nan) {
            return Err("max_file_size_mb must be a number".to_string());
        }
        Ok(())
    }

    /// Set the extension allow-list from any list of labels.
    pub fn extensions<I, S>(&mut self, extensions: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.supported_extensions = Some(normalize_extensions(extensions));
        self
    }
}

impl Default for MegaDocConfig {
    fn default() -> Self {
        Self {
            supported_extensions: default_extensions(),
            special_filenames: default_special_filenames(),
            max_preview_files: 10,
            max_error_preview: 5,
            max_file_size_mb: 100.0,
            default_encoding: TextEncoding::Utf8,
            fallback_encodings: default_fallback_encodings(),
            chunk_size: 8192,
            allow_path_traversal: false,
            max_depth_levels: 10,
            enable_caching: true,
            cache_size: 128,
            patterns: OnceLock::new(),
        }
    }
}

fn normalize_extensions<I, S>(extensions: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    extensions
        .into_iter()
        .map(|e| e.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|e| !e.is_empty())
        .collect()
}

impl MegaDocConfig {
    /// Create a config with default policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new config builder.
    pub fn builder() -> MegaDocConfigBuilder {
        MegaDocConfigBuilder::default()
    }

    /// The extension allow-list.
    pub fn supported_extensions(&self) -> &BTreeSet<String> {
        &self.supported_extensions
    }

    /// Replace the extension allow-list. Compiled patterns are dropped.
    pub fn set_supported_extensions<I, S>(&mut self, extensions: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.supported_extensions = normalize_extensions(extensions);
        self.patterns = OnceLock::new();
    }

    /// Check whether a filename carries an allowed extension (case-insensitive).
    pub fn validate_file_extension(&self, name: &str) -> bool {
        if name.is_empty() || self.supported_extensions.is_empty() {
            return false;
        }
        match extension(name) {
            Some(ext) => self.supported_extensions.contains(&ext.to_ascii_lowercase()),
            None => false,
        }
    }

    /// Check whether a basename is one of the special filenames.
    pub fn is_special_filename(&self, name: &str) -> bool {
        let base = basename(name);
        self.special_filenames
            .iter()
            .any(|special| special.eq_ignore_ascii_case(base))
    }

    /// A file is eligible when its extension is allowed or its name is special.
    pub fn is_eligible_file(&self, name: &str) -> bool {
        self.validate_file_extension(name) || self.is_special_filename(name)
    }

    /// Size ceiling in bytes. Not clamped: a negative setting stays negative.
    pub fn get_max_file_size_bytes(&self) -> i64 {
        (self.max_file_size_mb * 1024.0 * 1024.0) as i64
    }

    /// Whether a file of `size_bytes` exceeds the ceiling.
    pub fn is_file_too_large(&self, size_bytes: u64) -> bool {
        i64::try_from(size_bytes).map_or(true, |size| size > self.get_max_file_size_bytes())
    }

    /// The ordered fallback encodings.
    pub fn get_encoding_options(&self) -> &[TextEncoding] {
        &self.fallback_encodings
    }

    /// Encoding used for lossy decoding when every strict attempt fails.
    pub fn permissive_encoding(&self) -> TextEncoding {
        let mut chain = vec![self.default_encoding];
        chain.extend_from_slice(&self.fallback_encodings);
        most_permissive(&chain)
    }

    /// Extraction patterns, compiled on first access.
    pub fn file_patterns(&self) -> &FilePatterns {
        self.patterns.get_or_init(|| {
            tracing::debug!(
                extensions = self.supported_extensions.len(),
                "compiling extraction patterns"
            );
            FilePatterns::compile(self.supported_extensions.iter().map(String::as_str))
        })
    }

    /// Whether the extraction patterns have been compiled yet.
    pub fn patterns_compiled(&self) -> bool {
        self.patterns.get().is_some()
    }

    /// Export every tunable option as a JSON object.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_default()
    }

    /// Import options leniently.
    ///
    /// Missing keys keep their defaults. Values that cannot be coerced are
    /// logged and ignored.
    pub fn from_value(value: &Value) -> Self {
        let mut config = Self::default();
        let Some(options) = value.as_object() else {
            tracing::warn!("configuration is not an object, using defaults");
            return config;
        };

        for (key, raw) in options {
            if let Err(err) = config.apply_option(key, raw) {
                tracing::warn!(key = %key, error = %err, "ignoring configuration value");
            }
        }
        if let Err(err) = config.check_cache_size() {
            tracing::warn!(error = %err, "ignoring configuration value");
            config.cache_size = Self::default().cache_size;
        }
        config
    }

    /// Import options, failing on the first value that cannot be coerced.
    pub fn try_from_value(value: &Value) -> Result<Self> {
        let options = value.as_object().ok_or_else(|| MegaDocError::Configuration {
            message: "Configuration must be an object".to_string(),
            key: None,
        })?;

        let mut config = Self::default();
        for (key, raw) in options {
            config.apply_option(key, raw)?;
        }
        config.check_cache_size()?;
        Ok(config)
    }

    /// Parse options from TOML text.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let table: toml::Table = toml::from_str(source).map_err(|e| MegaDocError::Configuration {
            message: format!("Invalid TOML configuration: {e}"),
            key: None,
        })?;
        let value = serde_json::to_value(&table).map_err(|e| MegaDocError::Configuration {
            message: format!("Unsupported TOML value: {e}"),
            key: None,
        })?;
        Ok(Self::from_value(&value))
    }

    /// Load options from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path).map_err(|e| MegaDocError::Configuration {
            message: format!("Cannot read configuration file {}: {e}", path.display()),
            key: None,
        })?;
        Self::from_toml_str(&source)
    }

    /// Caching needs room for at least one record. Checked after every key is
    /// applied since `enable_caching` may follow `cache_size`.
    fn check_cache_size(&self) -> Result<()> {
        if self.enable_caching && self.cache_size == 0 {
            return Err(MegaDocError::config(
                "cache_size",
                "cache_size must be greater than zero when caching is enabled",
            ));
        }
        Ok(())
    }

    fn apply_option(&mut self, key: &str, raw: &Value) -> Result<()> {
        match key {
            "supported_extensions" => {
                let extensions = coerce_list(key, raw)?;
                self.set_supported_extensions(extensions);
            }
            "special_filenames" => {
                self.special_filenames = coerce_list(key, raw)?.into_iter().collect();
            }
            "max_preview_files" => self.max_preview_files = coerce(key, raw)?,
            "max_error_preview" => self.max_error_preview = coerce(key, raw)?,
            "max_file_size_mb" => self.max_file_size_mb = coerce(key, raw)?,
            "default_encoding" => self.default_encoding = coerce(key, raw)?,
            "fallback_encodings" | "encoding_fallbacks" => {
                self.fallback_encodings = coerce_list(key, raw)?
                    .iter()
                    .map(|label| {
                        label
                            .parse()
                            .map_err(|_| MegaDocError::config(key, format!("Unknown encoding: {label}")))
                    })
                    .collect::<Result<_>>()?;
            }
            "chunk_size" => {
                let size: usize = coerce(key, raw)?;
                if size == 0 {
                    return Err(MegaDocError::config(key, "chunk_size must be greater than zero"));
                }
                self.chunk_size = size;
            }
            "allow_path_traversal" => self.allow_path_traversal = coerce(key, raw)?,
            "max_depth_levels" => self.max_depth_levels = coerce(key, raw)?,
            "enable_caching" => self.enable_caching = coerce(key, raw)?,
            "cache_size" => self.cache_size = coerce(key, raw)?,
            _ => tracing::debug!(key = %key, "ignoring unknown configuration key"),
        }
        Ok(())
    }
}

/// Deserialize a value, accepting numbers and booleans spelled as strings.
fn coerce<T: DeserializeOwned>(key: &str, raw: &Value) -> Result<T> {
    T::deserialize(raw).or_else(|err| {
        if let Value::String(text) = raw {
            if let Ok(value) = serde_json::from_str::<T>(text.trim()) {
                return Ok(value);
            }
        }
        Err(MegaDocError::config(key, format!("Invalid value for {key}: {err}")))
    })
}

/// A list of strings, or a single comma/whitespace separated string.
fn coerce_list(key: &str, raw: &Value) -> Result<Vec<String>> {
    match raw {
        Value::String(text) => Ok(text
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()),
        _ => coerce(key, raw),
    }
}

fn basename(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}

/// Extension of the basename, ignoring a leading dot.
fn extension(name: &str) -> Option<&str> {
    let base = basename(name);
    match base.rfind('.') {
        Some(0) | None => None,
        Some(idx) if idx + 1 < base.len() => Some(&base[idx + 1..]),
        Some(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MegaDocConfig::default();
        assert_eq!(config.max_preview_files, 10);
        assert_eq!(config.max_error_preview, 5);
        assert_eq!(config.max_file_size_mb, 100.0);
        assert_eq!(config.default_encoding, TextEncoding::Utf8);
        assert_eq!(config.chunk_size, 8192);
        assert!(!config.allow_path_traversal);
        assert_eq!(config.max_depth_levels, 10);
        assert!(config.enable_caching);
        assert_eq!(config.cache_size, 128);
        for ext in ["py", "cpp", "h", "md", "json"] {
            assert!(config.supported_extensions().contains(ext));
        }
        for danger in ["sh", "bat", "exe", "ps1"] {
            assert!(!config.supported_extensions().contains(danger));
        }
    }

    #[test]
    fn test_config_builder() {
        let config = MegaDocConfig::builder()
            .max_depth_levels(3usize)
            .allow_path_traversal(true)
            .extensions([".PY", "txt", ""])
            .build()
            .unwrap();

        assert_eq!(config.max_depth_levels, 3);
        assert!(config.allow_path_traversal);
        assert_eq!(config.supported_extensions().len(), 2);
        assert!(config.validate_file_extension("a.py"));
        assert!(!config.validate_file_extension("a.cpp"));
    }

    #[test]
    fn test_builder_rejects_zero_chunk() {
        assert!(MegaDocConfig::builder().chunk_size(0usize).build().is_err());
        assert!(MegaDocConfig::builder().cache_size(0usize).build().is_err());
        assert!(
            MegaDocConfig::builder()
                .cache_size(0usize)
                .enable_caching(false)
                .build()
                .is_ok()
        );
    }

    #[test]
    fn test_validate_file_extension() {
        let config = MegaDocConfig::default();
        assert!(config.validate_file_extension("file.py"));
        assert!(config.validate_file_extension("src/script.cpp"));
        assert!(config.validate_file_extension("README.md"));
        assert!(config.validate_file_extension("file.PY"));
        assert!(!config.validate_file_extension("file.unknown"));
        assert!(!config.validate_file_extension("file"));
        assert!(!config.validate_file_extension("file."));
        assert!(!config.validate_file_extension(".gitignore"));
        assert!(!config.validate_file_extension(""));
    }

    #[test]
    fn test_empty_extensions_reject_everything() {
        let mut config = MegaDocConfig::default();
        config.set_supported_extensions(Vec::<String>::new());
        assert!(!config.validate_file_extension("file.py"));
        assert_eq!(config.file_patterns().len(), 7);
    }

    #[test]
    fn test_special_filenames() {
        let config = MegaDocConfig::default();
        assert!(config.is_special_filename("docker/Dockerfile"));
        assert!(config.is_special_filename("Makefile"));
        assert!(config.is_eligible_file("Makefile"));
        assert!(!config.is_eligible_file("Procfile"));
    }

    #[test]
    fn test_size_limits() {
        let mut config = MegaDocConfig::default();
        config.max_file_size_mb = 5.0;
        assert_eq!(config.get_max_file_size_bytes(), 5 * 1024 * 1024);

        config.max_file_size_mb = 1.0;
        assert!(!config.is_file_too_large(500 * 1024));
        assert!(!config.is_file_too_large(1024 * 1024));
        assert!(config.is_file_too_large(1024 * 1024 + 1));
    }

    #[test]
    fn test_negative_size_limit() {
        let mut config = MegaDocConfig::default();
        config.max_file_size_mb = -1.0;
        assert_eq!(config.get_max_file_size_bytes(), -1024 * 1024);
        assert!(config.is_file_too_large(0));
        assert!(config.is_file_too_large(100));
    }

    #[test]
    fn test_patterns_are_lazy_and_cached() {
        let config = MegaDocConfig::default();
        assert!(!config.patterns_compiled());

        let first = config.file_patterns();
        assert!(config.patterns_compiled());
        assert_eq!(first.len(), 7);

        let second = config.file_patterns();
        assert!(std::ptr::eq(first, second));
    }

    #[test]
    fn test_changing_extensions_drops_patterns() {
        let mut config = MegaDocConfig::default();
        let _ = config.file_patterns();
        config.set_supported_extensions(["py"]);
        assert!(!config.patterns_compiled());
    }

    #[test]
    fn test_encoding_options() {
        let config = MegaDocConfig::default();
        let options = config.get_encoding_options();
        assert_eq!(options.len(), 4);
        assert!(options.contains(&TextEncoding::Latin1));
        assert!(options.contains(&TextEncoding::Utf16));
        assert_eq!(config.permissive_encoding(), TextEncoding::Latin1);
    }

    #[test]
    fn test_value_round_trip() {
        let mut config = MegaDocConfig::default();
        config.max_preview_files = 5;
        config.max_file_size_mb = 50.0;
        config.allow_path_traversal = true;
        config.set_supported_extensions(["py", "h"]);

        let value = config.to_value();
        assert_eq!(value["max_preview_files"], 5);
        assert_eq!(value["max_file_size_mb"], 50.0);
        assert!(value["supported_extensions"].is_array());
        assert_eq!(value["default_encoding"], "utf-8");

        let restored = MegaDocConfig::from_value(&value);
        assert_eq!(restored.to_value(), value);
    }

    #[test]
    fn test_from_value_partial() {
        let value = serde_json::json!({
            "supported_extensions": ["py", "cpp", "h"],
            "max_preview_files": 3,
            "max_file_size_mb": 25,
            "default_encoding": "ascii"
        });
        let config = MegaDocConfig::from_value(&value);

        assert_eq!(config.supported_extensions().len(), 3);
        assert_eq!(config.max_preview_files, 3);
        assert_eq!(config.max_file_size_mb, 25.0);
        assert_eq!(config.default_encoding, TextEncoding::Ascii);
        assert_eq!(config.cache_size, 128);
    }

    #[test]
    fn test_from_value_is_lenient() {
        let config = MegaDocConfig::from_value(&serde_json::json!({}));
        assert_eq!(config.max_preview_files, 10);

        let config = MegaDocConfig::from_value(&serde_json::json!({
            "max_preview_files": "not_a_number",
            "supported_extensions": "py, md",
            "max_depth_levels": "4",
            "default_encoding": "klingon",
            "unknown_key": true
        }));
        assert_eq!(config.max_preview_files, 10);
        assert_eq!(config.max_depth_levels, 4);
        assert_eq!(config.default_encoding, TextEncoding::Utf8);
        assert_eq!(config.supported_extensions().len(), 2);

        let config = MegaDocConfig::from_value(&serde_json::json!(["not", "an", "object"]));
        assert_eq!(config.cache_size, 128);
    }

    #[test]
    fn test_try_from_value_reports_key() {
        let err = MegaDocConfig::try_from_value(&serde_json::json!({
            "cache_size": "lots"
        }))
        .unwrap_err();
        match err {
            MegaDocError::Configuration { key, .. } => assert_eq!(key.as_deref(), Some("cache_size")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_zero_cache_size_needs_caching_off() {
        let config = MegaDocConfig::from_value(&serde_json::json!({ "cache_size": 0 }));
        assert_eq!(config.cache_size, 128);

        let err = MegaDocConfig::try_from_value(&serde_json::json!({ "cache_size": 0 })).unwrap_err();
        assert_eq!(err.error_code(), "CONFIG");

        let config = MegaDocConfig::try_from_value(&serde_json::json!({
            "cache_size": 0,
            "enable_caching": false
        }))
        .unwrap();
        assert_eq!(config.cache_size, 0);

        let config = MegaDocConfig::from_toml_str("cache_size = 0").unwrap();
        assert_eq!(config.cache_size, 128);
    }

    #[test]
    fn test_from_toml() {
        let config = MegaDocConfig::from_toml_str(
            r#"
            max_depth_levels = 4
            allow_path_traversal = true
            supported_extensions = ["rs", "toml"]
            fallback_encodings = ["utf-8", "cp1252"]
            "#,
        )
        .unwrap();

        assert_eq!(config.max_depth_levels, 4);
        assert!(config.allow_path_traversal);
        assert!(config.validate_file_extension("Cargo.toml"));
        assert_eq!(
            config.get_encoding_options(),
            &[TextEncoding::Utf8, TextEncoding::Cp1252]
        );

        assert!(MegaDocConfig::from_toml_str("not = [valid").is_err());
    }
}
