#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
/// Identifier for all tensors of a matmul
///
/// Useful to specialize some functions depending on the tensor
pub enum MatmulIdent {
    Lhs,
    Rhs,
    /// The fused epilogue operand of an addmm.
    Source,
    Out,
}
