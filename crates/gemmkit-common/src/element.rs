use core::fmt::{Debug, Display};
use core::ops::{Add, AddAssign, Mul, MulAssign, Sub};
use half::{bf16, f16};

/// Scalar type that can be loaded, accumulated and stored by a kernel.
///
/// Conversions go through `f64`, which represents every supported element exactly, so a cast
/// rounds at most once: at the destination type.
pub trait Numeric:
    Copy
    + Default
    + PartialEq
    + PartialOrd
    + Debug
    + Display
    + Send
    + Sync
    + 'static
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + AddAssign
    + MulAssign
    + num_traits::Zero
    + num_traits::One
{
    /// Short name used in logs and kernel ids.
    const NAME: &'static str;

    /// Converts from a `f64`, rounding to the nearest representable value.
    fn from_f64(value: f64) -> Self;

    /// Converts to a `f64`.
    fn to_f64(self) -> f64;

    /// Machine epsilon of the type, `0` for integers.
    fn epsilon() -> f64;

    /// Casts to another numeric type.
    fn cast<T: Numeric>(self) -> T {
        T::from_f64(self.to_f64())
    }

    /// Builds a vector from `f64` values.
    fn from_values(values: &[f64]) -> Vec<Self> {
        values.iter().map(|v| Self::from_f64(*v)).collect()
    }
}

macro_rules! impl_numeric_float {
    ($ty:ty, $name:literal, $from:expr, $to:expr, $eps:expr) => {
        impl Numeric for $ty {
            const NAME: &'static str = $name;

            fn from_f64(value: f64) -> Self {
                $from(value)
            }

            fn to_f64(self) -> f64 {
                $to(self)
            }

            fn epsilon() -> f64 {
                $eps
            }
        }
    };
}

impl_numeric_float!(
    f16,
    "f16",
    f16::from_f64,
    f16::to_f64,
    f16::EPSILON.to_f64()
);
impl_numeric_float!(
    bf16,
    "bf16",
    bf16::from_f64,
    bf16::to_f64,
    bf16::EPSILON.to_f64()
);
impl_numeric_float!(
    f32,
    "f32",
    |v: f64| v as f32,
    |v: f32| v as f64,
    f32::EPSILON as f64
);
impl_numeric_float!(f64, "f64", |v: f64| v, |v: f64| v, f64::EPSILON);

impl Numeric for i32 {
    const NAME: &'static str = "i32";

    fn from_f64(value: f64) -> Self {
        value.round() as i32
    }

    fn to_f64(self) -> f64 {
        self as f64
    }

    fn epsilon() -> f64 {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn cast_rounds_once_at_destination() {
        let value = 1.0f32 + f32::EPSILON;

        assert_eq!(value.cast::<f64>(), 1.0 + f32::EPSILON as f64);
        assert_eq!(value.cast::<f16>(), f16::ONE);
        assert_eq!(f16::from_f64(2.5).cast::<i32>(), 3);
    }

    #[test]
    fn half_types_round_trip_small_integers() {
        for v in -16..16 {
            assert_eq!(f16::from_f64(v as f64).to_f64(), v as f64);
            assert_eq!(bf16::from_f64(v as f64).to_f64(), v as f64);
        }
    }
}
