/// Tiled GEMM with fused addmm
pub mod gemm;
/// Masked matrix-vector products
pub mod gemv;
/// Reduction split across cubes
pub mod split_k;

mod naive;

pub use naive::*;
