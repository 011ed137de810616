use gemmkit_matmul::components::{MatmulAvailabilityError, MatmulSetupError};
use std::fmt::{Debug, Display};

/// Errors that can occur during the setup phase of a convolution.
pub enum ConvSetupError {
    /// The underlying GEMM can't be set up.
    Matmul(MatmulSetupError),

    /// The convolution itself is ill-formed.
    Geometry(String),
}

impl From<MatmulSetupError> for ConvSetupError {
    fn from(value: MatmulSetupError) -> Self {
        Self::Matmul(value)
    }
}

impl From<MatmulAvailabilityError> for ConvSetupError {
    fn from(value: MatmulAvailabilityError) -> Self {
        Self::Matmul(value.into())
    }
}

impl Display for ConvSetupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Matmul(err) => write!(f, "{err}"),
            Self::Geometry(msg) => write!(f, "Invalid convolution geometry: {msg}"),
        }
    }
}

impl Debug for ConvSetupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}
