use core::fmt::Debug;
use derive_new::new;
use gemmkit_common::Numeric;

/// A transform fused into the store of an accumulator tile.
///
/// Epilogues run in the accumulation precision, before the single cast to the output type.
pub trait Epilogue<A: Numeric>: Copy + Debug + Send + Sync {
    /// Transforms an accumulated value alone.
    fn apply(&self, x: A) -> A;

    /// Transforms an accumulated value combined with the matching element of a source
    /// operand. Ignores the source unless the epilogue needs it.
    fn apply_with(&self, x: A, c: A) -> A {
        let _ = c;
        self.apply(x)
    }
}

/// Identity: the accumulator is only cast.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransformNone;

/// `x + c`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransformAdd;

/// `alpha·x + beta·c`. Without a source, `alpha·x`.
#[derive(new, Debug, Clone, Copy)]
pub struct TransformAxpby<A> {
    pub alpha: A,
    pub beta: A,
}

/// `scale·x`.
#[derive(new, Debug, Clone, Copy)]
pub struct TransformScale<A> {
    pub scale: A,
}

impl<A: Numeric> Epilogue<A> for TransformNone {
    fn apply(&self, x: A) -> A {
        x
    }
}

impl<A: Numeric> Epilogue<A> for TransformAdd {
    fn apply(&self, x: A) -> A {
        x
    }

    fn apply_with(&self, x: A, c: A) -> A {
        x + c
    }
}

impl<A: Numeric> Epilogue<A> for TransformAxpby<A> {
    fn apply(&self, x: A) -> A {
        self.alpha * x
    }

    fn apply_with(&self, x: A, c: A) -> A {
        self.alpha * x + self.beta * c
    }
}

impl<A: Numeric> Epilogue<A> for TransformScale<A> {
    fn apply(&self, x: A) -> A {
        self.scale * x
    }
}
