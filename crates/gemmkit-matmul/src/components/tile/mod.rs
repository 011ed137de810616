mod fragment;
mod layout;
mod warp_mma;

pub use fragment::*;
pub use layout::*;
pub use warp_mma::*;
