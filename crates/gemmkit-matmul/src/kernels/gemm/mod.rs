mod kernel;
mod launch;

pub use kernel::*;
pub use launch::*;
