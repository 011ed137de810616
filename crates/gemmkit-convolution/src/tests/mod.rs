//! Test launchers for the convolution kernels, exported with the `export_tests` feature.
pub mod convolution_test_launcher;
pub mod test_utils;
