//! Runtime pieces shared by every gemmkit kernel family.
//!
//! - [config]: the global configuration, loaded from `gemmkit.toml` and environment variables,
//!   and the [Logger](config::Logger) built from it.
//! - [client]: the [ComputeClient](client::ComputeClient) that executes a grid of cubes.
//! - [kernel]: the [CubeKernel](kernel::CubeKernel) trait implemented by every kernel.

/// Global configuration and logging.
pub mod config;

/// Grid executor.
pub mod client;

/// Kernel trait and naming.
pub mod kernel;

pub use client::{ComputeClient, HardwareProperties};
pub use kernel::CubeKernel;
