//! Process-wide default configuration for front-ends.
//!
//! Library components never read this; they take the config they are given.

use std::sync::{Arc, LazyLock, PoisonError, RwLock};

use crate::config::MegaDocConfig;

static GLOBAL_CONFIG: LazyLock<RwLock<Arc<MegaDocConfig>>> =
    LazyLock::new(|| RwLock::new(Arc::new(MegaDocConfig::default())));

/// The current process-wide configuration.
pub fn get_config() -> Arc<MegaDocConfig> {
    GLOBAL_CONFIG
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Replace the process-wide configuration.
pub fn set_config(config: MegaDocConfig) {
    *GLOBAL_CONFIG.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(config);
}

/// Restore the default process-wide configuration.
pub fn reset_config() {
    set_config(MegaDocConfig::default());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_reset() {
        let mut config = MegaDocConfig::default();
        config.max_preview_files = 42;
        set_config(config);
        assert_eq!(get_config().max_preview_files, 42);

        reset_config();
        assert_eq!(get_config().max_preview_files, 10);
    }
}
