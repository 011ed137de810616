//! Test launchers shared by the kernels, exported with the `export_tests` feature.
pub mod gemv;
pub mod test_utils;
