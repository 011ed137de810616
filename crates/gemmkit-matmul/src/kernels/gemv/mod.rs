mod config;
mod kernel;
mod kernel_t;
mod launch;
mod mask;
mod problem;

pub use config::*;
pub use kernel::*;
pub use kernel_t::*;
pub use launch::*;
pub use mask::*;
pub use problem::*;
