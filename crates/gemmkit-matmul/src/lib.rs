//! Blocked matrix multiplication kernels.
//!
//! The crate is organized the same way the kernels are: [components] holds the reusable
//! building blocks (the [TileLoader](components::global::TileLoader) that stages operand tiles
//! into shared memory, the [WarpMma](components::tile::WarpMma) that multiplies them into
//! per-plane accumulators, epilogues, params and configs) and [kernels] holds the drivers
//! built from them: the tiled GEMM, Split-K, masked GEMV and a naive reference.
//!
//! Most users only need [launch] with a [Strategy].

/// Components for matrix multiplication
pub mod components;
/// Contains matmul kernels
pub mod kernels;

#[cfg(any(test, feature = "export_tests"))]
pub mod tests;

mod base;

pub use base::*;
