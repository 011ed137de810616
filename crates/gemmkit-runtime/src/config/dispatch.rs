use core::str::FromStr;

use super::logger::{LogLevel, LoggerConfig};

/// Configuration for the cube grid executor.
#[derive(Default, Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct DispatchConfig {
    /// Logger for kernel launches.
    #[serde(default)]
    pub logger: LoggerConfig<DispatchLogLevel>,

    /// Order in which the cubes of a grid are executed.
    #[serde(default)]
    pub order: CubeOrder,
}

/// Order in which cubes are executed.
///
/// Cubes of a grid are independent, so every order must produce the same output. The
/// reverse and shuffled orders check it.
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum CubeOrder {
    /// Linear order, `x` fastest.
    #[default]
    #[serde(rename = "forward")]
    Forward,
    /// Linear order, last cube first.
    #[serde(rename = "reverse")]
    Reverse,
    /// Random permutation drawn from `seed`.
    #[serde(rename = "shuffled")]
    Shuffled {
        /// Seed of the permutation.
        seed: u64,
    },
}

impl FromStr for CubeOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            None => match s {
                "forward" => Ok(CubeOrder::Forward),
                "reverse" => Ok(CubeOrder::Reverse),
                "shuffled" => Ok(CubeOrder::Shuffled { seed: 0 }),
                other => Err(format!("Unknown cube order {other}")),
            },
            Some(("shuffled", seed)) => seed
                .parse()
                .map(|seed| CubeOrder::Shuffled { seed })
                .map_err(|err| format!("Invalid shuffle seed {seed}: {err}")),
            Some((other, _)) => Err(format!("Unknown cube order {other}")),
        }
    }
}

/// Verbosity of dispatch logs.
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum DispatchLogLevel {
    /// Nothing is logged.
    #[default]
    #[serde(rename = "disabled")]
    Disabled,
    /// One line per launch: kernel, cube count and cube dim.
    #[serde(rename = "basic")]
    Basic,
    /// Also a summary of executed cubes and barriers.
    #[serde(rename = "full")]
    Full,
}

impl LogLevel for DispatchLogLevel {
    fn is_disabled(&self) -> bool {
        matches!(self, DispatchLogLevel::Disabled)
    }
}
