//! Common building blocks shared by the gemmkit crates.
//!
//! The kernels are written against an accelerator execution model: a grid of cooperative
//! thread groups (cubes), each made of 32-lane SIMD groups (planes), with a small group-shared
//! scratch memory and barrier synchronization. This crate provides a faithful CPU emulation of
//! that model, plus the numeric element abstraction every kernel is generic over.

/// Element types usable in kernels.
pub mod element;

/// Cube (thread group) execution model.
pub mod cube;

/// Group-shared memory with barrier discipline.
pub mod shared;

/// Plane (SIMD group) collective operations.
pub mod plane;

/// Index to offset helpers for strided and broadcast tensors.
pub mod index;

/// Seeded random number generation.
pub mod rand;

pub use cube::*;
pub use element::*;
pub use shared::{Phase, SharedMemory};
