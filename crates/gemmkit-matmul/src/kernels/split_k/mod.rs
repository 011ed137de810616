mod accumulate;
mod kernel;
mod launch;
mod selection;

pub use accumulate::*;
pub use kernel::*;
pub use launch::*;
pub use selection::*;
