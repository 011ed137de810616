use super::logger::{LogLevel, LoggerConfig};

/// Configuration for matmul planning: strategy selection, swizzling and Split-K.
#[derive(Default, Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct MatmulConfig {
    /// Logger for selection decisions.
    #[serde(default)]
    pub logger: LoggerConfig<MatmulLogLevel>,

    /// Forces the cube swizzle factor (as a power of two). Picked from the problem when unset.
    #[serde(default)]
    pub swizzle_log: Option<u32>,

    /// When to partition the reduction across cubes.
    #[serde(default)]
    pub split_k: SplitKConfig,
}

/// Thresholds for the automatic Split-K selection.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct SplitKConfig {
    /// Allows the automatic strategy to pick Split-K.
    #[serde(default = "enabled_default")]
    pub enabled: bool,

    /// Minimum number of 16-wide K tiles before Split-K pays off.
    #[serde(default = "min_k_tiles_default")]
    pub min_k_tiles: usize,

    /// Maximum number of 16×16 output tiles for which Split-K is still considered.
    #[serde(default = "max_output_tiles_default")]
    pub max_output_tiles: usize,
}

impl Default for SplitKConfig {
    fn default() -> Self {
        Self {
            enabled: enabled_default(),
            min_k_tiles: min_k_tiles_default(),
            max_output_tiles: max_output_tiles_default(),
        }
    }
}

fn enabled_default() -> bool {
    true
}

fn min_k_tiles_default() -> usize {
    8
}

fn max_output_tiles_default() -> usize {
    32
}

/// Verbosity of matmul planning logs.
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum MatmulLogLevel {
    /// Nothing is logged.
    #[default]
    #[serde(rename = "disabled")]
    Disabled,
    /// The selected strategy and tiling.
    #[serde(rename = "basic")]
    Basic,
    /// Also the derived parameters of every launch.
    #[serde(rename = "full")]
    Full,
}

impl LogLevel for MatmulLogLevel {
    fn is_disabled(&self) -> bool {
        matches!(self, MatmulLogLevel::Disabled)
    }
}
