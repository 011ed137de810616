//! Convolutions run as implicit GEMMs.
//!
//! A channels-last convolution is a GEMM whose rows are output pixels, whose columns are
//! filters and whose reduction runs over kernel taps and channels. Nothing is materialized:
//! the loaders in [components::loader] gather each receptive field while staging the A tile,
//! and the product reuses the [WarpMma](gemmkit_matmul::components::tile::WarpMma) of the
//! matmul crate.
//!
//! Two kernels cover the geometries. The implicit kernel handles undilated inputs whose
//! groups have whole channel blocks. The general kernel handles the rest, splitting inputs
//! dilated by `idil` into output phases so that every tap it visits lands on a real pixel.

/// Components for convolution
pub mod components;
/// Contains convolution kernels
pub mod kernels;

#[cfg(any(test, feature = "export_tests"))]
pub mod tests;

mod launch;

pub use launch::*;
