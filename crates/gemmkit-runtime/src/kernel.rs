use gemmkit_common::Cube;

use crate::config::{TypeNameFormatLevel, type_name_format};

/// A kernel that can be executed on a grid of cubes.
///
/// The client calls [execute](CubeKernel::execute) once per cube, in an unspecified order.
/// Cubes must be independent: a kernel may only write the output region owned by the cube
/// it is executing.
pub trait CubeKernel {
    /// Runs the whole kernel body for one cube.
    fn execute(&mut self, cube: &Cube);

    /// Identifier of the kernel, used in logs.
    fn id(&self) -> String {
        type_name_format(core::any::type_name::<Self>(), TypeNameFormatLevel::Balanced)
    }
}
