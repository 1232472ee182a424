//! Dataset configuration.

/// Configuration for dataset collection naming and lifecycle defaults.
#[derive(Debug, Clone)]
pub struct DatasetConfig {
    /// Prefix for per-dataset sample collection names.
    pub sample_collection_prefix: String,

    /// Prefix for per-dataset frame collection names.
    pub frame_collection_prefix: String,

    /// Whether new datasets survive registry cleanup by default.
    pub persistent_default: bool,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            sample_collection_prefix: "samples".to_string(),
            frame_collection_prefix: "frames".to_string(),
            persistent_default: false,
        }
    }
}

impl DatasetConfig {
    /// Load configuration from `FRAMELAB_`-prefixed environment variables.
    /// Unset or invalid values fall back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let sample_collection_prefix = std::env::var("FRAMELAB_SAMPLE_COLLECTION_PREFIX")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.sample_collection_prefix);

        let frame_collection_prefix = std::env::var("FRAMELAB_FRAME_COLLECTION_PREFIX")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.frame_collection_prefix);

        let persistent_default = std::env::var("FRAMELAB_PERSISTENT_DEFAULT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.persistent_default);

        Self {
            sample_collection_prefix,
            frame_collection_prefix,
            persistent_default,
        }
    }
}
