use core::fmt::Display;
use std::sync::Arc;

use gemmkit_common::{
    Cube, CubeCount, CubeDim, MAX_UNITS_PER_CUBE, PLANE_DIM, SHARED_MEMORY_BYTES,
    rand::{SliceRandom, seeded_rng},
};

use crate::{
    config::{
        GlobalConfig, Logger,
        dispatch::{CubeOrder, DispatchLogLevel},
        matmul::MatmulLogLevel,
    },
    kernel::CubeKernel,
};

/// Limits of the emulated device, checked by the planners before launching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HardwareProperties {
    /// Lanes per plane.
    pub plane_dim: u32,
    /// Maximum number of units in one cube.
    pub max_units_per_cube: u32,
    /// Group-shared memory per cube, in bytes.
    pub max_shared_memory: usize,
    /// Maximum number of cubes along each grid axis.
    pub max_cube_count: CubeCount,
}

impl Default for HardwareProperties {
    fn default() -> Self {
        Self {
            plane_dim: PLANE_DIM,
            max_units_per_cube: MAX_UNITS_PER_CUBE,
            max_shared_memory: SHARED_MEMORY_BYTES,
            max_cube_count: CubeCount::new(u16::MAX as u32, u16::MAX as u32, u16::MAX as u32),
        }
    }
}

/// Entry point to execute kernels.
///
/// The client runs every cube of a grid to completion, one after the other, in the order
/// given by the dispatch configuration.
pub struct ComputeClient {
    config: Arc<GlobalConfig>,
    logger: spin::Mutex<Logger>,
    order: CubeOrder,
    properties: HardwareProperties,
}

impl core::fmt::Debug for ComputeClient {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ComputeClient")
            .field("order", &self.order)
            .field("properties", &self.properties)
            .finish()
    }
}

impl Default for ComputeClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ComputeClient {
    /// Creates a client from the global configuration.
    pub fn new() -> Self {
        Self::from_config(GlobalConfig::get())
    }

    /// Creates a client from an explicit configuration.
    pub fn from_config(config: Arc<GlobalConfig>) -> Self {
        let order = config.dispatch.order;

        Self {
            logger: spin::Mutex::new(Logger::from_config(config.clone())),
            config,
            order,
            properties: HardwareProperties::default(),
        }
    }

    /// Overrides the order in which cubes are executed.
    pub fn with_order(mut self, order: CubeOrder) -> Self {
        self.order = order;
        self
    }

    /// The configuration the client was created from.
    pub fn config(&self) -> &GlobalConfig {
        &self.config
    }

    /// The order in which cubes are executed.
    pub fn order(&self) -> CubeOrder {
        self.order
    }

    /// Properties of the emulated device.
    pub fn properties(&self) -> &HardwareProperties {
        &self.properties
    }

    /// Current log level of matmul planning.
    pub fn matmul_log_level(&self) -> MatmulLogLevel {
        self.logger.lock().log_level_matmul()
    }

    /// Logs a matmul planning message.
    pub fn log_matmul<S: Display>(&self, msg: &S) {
        self.logger.lock().log_matmul(msg);
    }

    /// Executes `kernel` on every cube of a `count` grid of `dim` cubes.
    ///
    /// # Panics
    ///
    /// If the launch exceeds the [properties](Self::properties) of the device. Planners check
    /// the same limits and report them as setup errors, so this only fires on a planner bug.
    pub fn execute<K: CubeKernel>(&self, kernel: &mut K, count: CubeCount, dim: CubeDim) {
        assert!(
            dim.num_elems() <= self.properties.max_units_per_cube,
            "Cube dim {dim} exceeds {} units",
            self.properties.max_units_per_cube
        );
        let max = self.properties.max_cube_count;
        assert!(
            count.x <= max.x && count.y <= max.y && count.z <= max.z,
            "Cube count {count} exceeds {max}"
        );

        let level = self.logger.lock().log_level_dispatch();
        if !matches!(level, DispatchLogLevel::Disabled) {
            let msg = format!(
                "[Launch] {} cube_count={count} cube_dim={dim} order={:?}",
                kernel.id(),
                self.order
            );
            self.logger.lock().log_dispatch(&msg);
        }

        let mut barriers = 0;
        for index in self.cube_indices(count) {
            let cube = Cube::new(count.position(index), dim, count);
            kernel.execute(&cube);
            barriers += cube.barrier_count();
        }

        log::trace!("Executed {} cubes, {barriers} barriers", count.num_cubes());
        if matches!(level, DispatchLogLevel::Full) {
            let msg = format!(
                "[Launch] {} done: cubes={} barriers={barriers}",
                kernel.id(),
                count.num_cubes()
            );
            self.logger.lock().log_dispatch(&msg);
        }
    }

    fn cube_indices(&self, count: CubeCount) -> Vec<usize> {
        let num_cubes = count.num_cubes();

        match self.order {
            CubeOrder::Forward => (0..num_cubes).collect(),
            CubeOrder::Reverse => (0..num_cubes).rev().collect(),
            CubeOrder::Shuffled { seed } => {
                let mut indices: Vec<usize> = (0..num_cubes).collect();
                indices.shuffle(&mut seeded_rng(seed));
                indices
            }
        }
    }
}
