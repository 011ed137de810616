/// Dispatch config module.
pub mod dispatch;
/// Matmul config module.
pub mod matmul;

mod base;
mod logger;

pub use base::*;
pub use logger::*;
