use gemmkit_common::Numeric;
use half::{bf16, f16};

/// Element types of a matmul: input, accumulator and output.
///
/// Inputs are staged in shared memory as `EI`, multiplied and reduced in `EA`, and cast to
/// `EO` exactly once, when the result is stored.
pub trait MatmulPrecision: Send + Sync + Copy + 'static {
    /// Element type of both operands.
    type EI: Numeric;
    /// Element type of the accumulators.
    type EA: Numeric;
    /// Element type of the output.
    type EO: Numeric;
}

impl MatmulPrecision for f16 {
    type EI = f16;
    type EA = f32;
    type EO = f16;
}

impl MatmulPrecision for bf16 {
    type EI = bf16;
    type EA = f32;
    type EO = bf16;
}

impl MatmulPrecision for f32 {
    type EI = f32;
    type EA = f32;
    type EO = f32;
}

impl MatmulPrecision for f64 {
    type EI = f64;
    type EA = f64;
    type EO = f64;
}

impl<EI: Numeric, EA: Numeric, EO: Numeric> MatmulPrecision for (EI, EA, EO) {
    type EI = EI;
    type EA = EA;
    type EO = EO;
}
