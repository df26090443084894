//! Database configuration.

/// Configuration for opening a database.
///
/// The link bag thresholds govern the adaptive representation of
/// [`crate::RidBag`]: a bag converts from the inline representation to a
/// persisted tree when its size reaches the up-threshold at save time, and
/// back when it falls to the down-threshold. A negative down-threshold
/// disables the tree-to-inline direction.
#[derive(Debug, Clone)]
pub struct Config {
    /// Entry count at which an embedded bag converts to a tree on save.
    pub ridbag_embedded_to_tree_threshold: i32,

    /// Entry count at or below which a tree bag converts back to embedded
    /// on save. Negative disables the conversion.
    pub ridbag_tree_to_embedded_threshold: i32,

    /// Whether documents record change timelines by default.
    pub track_changes: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ridbag_embedded_to_tree_threshold: 40,
            ridbag_tree_to_embedded_threshold: 30,
            track_changes: true,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the embedded-to-tree threshold.
    #[must_use]
    pub const fn ridbag_embedded_to_tree_threshold(mut self, value: i32) -> Self {
        self.ridbag_embedded_to_tree_threshold = value;
        self
    }

    /// Sets the tree-to-embedded threshold. Negative disables the
    /// conversion.
    #[must_use]
    pub const fn ridbag_tree_to_embedded_threshold(mut self, value: i32) -> Self {
        self.ridbag_tree_to_embedded_threshold = value;
        self
    }

    /// Sets whether documents track changes by default.
    #[must_use]
    pub const fn track_changes(mut self, value: bool) -> Self {
        self.track_changes = value;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.ridbag_embedded_to_tree_threshold, 40);
        assert_eq!(config.ridbag_tree_to_embedded_threshold, 30);
        assert!(config.track_changes);
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .ridbag_embedded_to_tree_threshold(5)
            .ridbag_tree_to_embedded_threshold(-1)
            .track_changes(false);

        assert_eq!(config.ridbag_embedded_to_tree_threshold, 5);
        assert_eq!(config.ridbag_tree_to_embedded_threshold, -1);
        assert!(!config.track_changes);
    }
}
