use gemmkit_common::{CubeCount, CubeDim};
use gemmkit_runtime::HardwareProperties;
use std::fmt::{Debug, Display};

use super::MatmulIdent;

/// Why a matmul could not be launched. Returned before any cube runs.
pub enum MatmulSetupError {
    /// The launch does not fit the runtime or the buffers.
    Unavailable(MatmulAvailabilityError),

    /// A component rejected the problem or the tiling.
    InvalidConfig(InvalidConfigError),
}

pub enum MatmulAvailabilityError {
    CubeCountTooBig(CubeCount),
    CubeDimTooBig(CubeDim),
    /// Planes are always 32 units wide.
    PlaneDimUnsupported { plane_dim: u32 },
    /// Bytes of staged tiles against the shared memory of one cube.
    SharedMemoryTooBig { required: usize, available: usize },
    /// A buffer is shorter than what its shape and strides address.
    BufferTooSmall {
        ident: MatmulIdent,
        len: usize,
        required: usize,
    },
}

impl From<MatmulAvailabilityError> for MatmulSetupError {
    fn from(value: MatmulAvailabilityError) -> Self {
        Self::Unavailable(value)
    }
}

impl From<InvalidConfigError> for MatmulSetupError {
    fn from(value: InvalidConfigError) -> Self {
        Self::InvalidConfig(value)
    }
}

impl Display for MatmulSetupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable(err) => write!(f, "Matmul launch unavailable: {err}"),
            Self::InvalidConfig(err) => write!(f, "Invalid matmul config: {err}"),
        }
    }
}

impl Debug for MatmulSetupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

impl Display for MatmulAvailabilityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CubeCountTooBig(count) => {
                write!(f, "{count:?} exceeds the maximum cube count")
            }
            Self::CubeDimTooBig(dim) => write!(f, "{dim:?} has too many units per cube"),
            Self::PlaneDimUnsupported { plane_dim } => {
                write!(f, "planes of {plane_dim} units, expected 32")
            }
            Self::SharedMemoryTooBig {
                required,
                available,
            } => write!(
                f,
                "stages need {required} bytes of shared memory, a cube has {available}"
            ),
            Self::BufferTooSmall {
                ident,
                len,
                required,
            } => write!(f, "{ident:?} holds {len} elements, {required} are addressed"),
        }
    }
}

impl Debug for MatmulAvailabilityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

pub type InvalidConfigError = Box<dyn Display>;

/// A config error whose message is built lazily, when printed.
pub struct FormattedConfigError {
    message: Box<dyn Fn() -> String>,
}

impl FormattedConfigError {
    #[allow(clippy::new_ret_no_self)]
    pub fn new<F: Fn() -> String + 'static>(func: F) -> Box<dyn Display> {
        Box::new(Self {
            message: Box::new(func),
        })
    }
}

impl Display for FormattedConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&(self.message)())
    }
}

/// Checks that a launch fits the device.
pub fn check_launch(
    properties: &HardwareProperties,
    count: CubeCount,
    dim: CubeDim,
) -> Result<(), MatmulSetupError> {
    if dim.x != properties.plane_dim {
        return Err(MatmulAvailabilityError::PlaneDimUnsupported { plane_dim: dim.x }.into());
    }

    if dim.num_elems() > properties.max_units_per_cube {
        return Err(MatmulAvailabilityError::CubeDimTooBig(dim).into());
    }

    let max = properties.max_cube_count;
    if count.x > max.x || count.y > max.y || count.z > max.z {
        return Err(MatmulAvailabilityError::CubeCountTooBig(count).into());
    }

    Ok(())
}

/// Builds a cube count from `usize` extents, failing when one does not fit in a `u32`.
pub fn cube_count(x: usize, y: usize, z: usize) -> Result<CubeCount, MatmulSetupError> {
    match (u32::try_from(x), u32::try_from(y), u32::try_from(z)) {
        (Ok(x), Ok(y), Ok(z)) => Ok(CubeCount::new(x, y, z)),
        _ => {
            let saturate = |v: usize| u32::try_from(v).unwrap_or(u32::MAX);
            let count = CubeCount::new(saturate(x), saturate(y), saturate(z));
            Err(MatmulAvailabilityError::CubeCountTooBig(count).into())
        }
    }
}

/// Checks that a buffer has at least `required` elements.
pub fn check_buffer_len(
    ident: MatmulIdent,
    len: usize,
    required: usize,
) -> Result<(), MatmulSetupError> {
    if len < required {
        return Err(MatmulAvailabilityError::BufferTooSmall {
            ident,
            len,
            required,
        }
        .into());
    }

    Ok(())
}
