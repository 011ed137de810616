pub mod batch;
pub mod global;
pub mod tile;

mod config;
mod epilogue;
mod error;
mod ident;
mod logging;
mod params;
mod precision;
mod problem;
mod source;

pub use config::*;
pub use epilogue::*;
pub use error::*;
pub use ident::*;
pub use logging::*;
pub use params::*;
pub use precision::*;
pub use problem::*;
pub use source::*;
