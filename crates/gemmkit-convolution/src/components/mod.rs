pub mod loader;

mod error;
mod params;
mod problem;
mod selection;

pub use error::*;
pub use params::*;
pub use problem::*;
pub use selection::*;
