//! Module: config
//! Responsibility: aggregator tuning knobs and their TOML loading.
//! Does not own: variant selection; aggregators read the resolved values.


use serde::Deserialize;
use thiserror::Error as ThisError;

const DEFAULT_TREE_FANOUT: usize = 16;
const DEFAULT_VECTOR_SIZE: usize = 2048;

///
/// WindowAggregationMode
///
/// Which aggregate-function APIs the aggregators may use.
/// `Window` allows a custom frame-aware `window` operation, `Combine` forces
/// the segment tree, `Separate` disables both and scans every frame.
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum WindowAggregationMode {
    #[default]
    Window,
    Combine,
    Separate,
}

impl WindowAggregationMode {
    #[must_use]
    pub const fn allows_window_api(self) -> bool {
        matches!(self, Self::Window)
    }

    #[must_use]
    pub const fn allows_combine_api(self) -> bool {
        !matches!(self, Self::Separate)
    }
}

///
/// ConfigError
///

#[derive(Debug, ThisError)]
pub enum ConfigError {
    #[error("window aggregate config is not valid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("tree_fanout must be at least 2, got {0}")]
    TreeFanout(usize),

    #[error("vector_size must be at least 1")]
    VectorSize,
}

///
/// WindowAggregateConfig
///
/// Resolved aggregator configuration. Getters clamp out-of-range values so
/// an unvalidated config can never stall the tree walk.
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct WindowAggregateConfig {
    mode: WindowAggregationMode,
    tree_fanout: usize,
    vector_size: usize,
    debug: bool,
}

impl WindowAggregateConfig {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            mode: WindowAggregationMode::Window,
            tree_fanout: DEFAULT_TREE_FANOUT,
            vector_size: DEFAULT_VECTOR_SIZE,
            debug: false,
        }
    }

    /// Parse and validate a TOML document such as
    /// `mode = "combine"` / `tree_fanout = 4`.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tree_fanout < 2 {
            return Err(ConfigError::TreeFanout(self.tree_fanout));
        }
        if self.vector_size == 0 {
            return Err(ConfigError::VectorSize);
        }

        Ok(())
    }

    #[must_use]
    pub const fn with_mode(mut self, mode: WindowAggregationMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub const fn with_tree_fanout(mut self, tree_fanout: usize) -> Self {
        self.tree_fanout = tree_fanout;
        self
    }

    #[must_use]
    pub const fn with_vector_size(mut self, vector_size: usize) -> Self {
        self.vector_size = vector_size;
        self
    }

    #[must_use]
    pub const fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    #[must_use]
    pub const fn mode(&self) -> WindowAggregationMode {
        self.mode
    }

    #[must_use]
    pub const fn tree_fanout(&self) -> usize {
        if self.tree_fanout < 2 { 2 } else { self.tree_fanout }
    }

    #[must_use]
    pub const fn vector_size(&self) -> usize {
        if self.vector_size == 0 { 1 } else { self.vector_size }
    }

    #[must_use]
    pub const fn debug(&self) -> bool {
        self.debug
    }
}

impl Default for WindowAggregateConfig {
    fn default() -> Self {
        Self::new()
    }
}
