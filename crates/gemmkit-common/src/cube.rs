use core::cell::Cell;
use derive_new::new;
use std::rc::Rc;

use crate::shared::{SharedMemory, SyncState};

/// Number of lanes in a plane (SIMD group). Every kernel in gemmkit assumes this width.
pub const PLANE_DIM: u32 = 32;

/// Group-shared memory available to a single cube, in bytes.
pub const SHARED_MEMORY_BYTES: usize = 32 * 1024;

/// Maximum number of units in a cube.
pub const MAX_UNITS_PER_CUBE: u32 = 1024;

/// Dimensions of a cube, `x` being the plane dimension and `y` the number of planes.
#[derive(new, Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
#[display("({x}, {y}, {z})")]
pub struct CubeDim {
    /// Units per plane.
    pub x: u32,
    /// Planes per cube.
    pub y: u32,
    /// Always 1 for the kernels in this workspace.
    pub z: u32,
}

impl CubeDim {
    /// A cube made of `num_planes` full planes.
    pub const fn new_planes(num_planes: u32) -> Self {
        Self {
            x: PLANE_DIM,
            y: num_planes,
            z: 1,
        }
    }

    /// Total number of units.
    pub const fn num_elems(&self) -> u32 {
        self.x * self.y * self.z
    }

    /// Number of planes in the cube.
    pub const fn num_planes(&self) -> u32 {
        self.num_elems().div_ceil(PLANE_DIM)
    }
}

/// Number of cubes to launch along each axis of the grid.
#[derive(new, Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
#[display("({x}, {y}, {z})")]
pub struct CubeCount {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl CubeCount {
    /// Total number of cubes in the grid.
    pub fn num_cubes(&self) -> usize {
        self.x as usize * self.y as usize * self.z as usize
    }

    /// The position of the cube with the given linear index, `x` varying fastest.
    pub fn position(&self, index: usize) -> CubePos {
        let x = self.x as usize;
        let xy = x * self.y as usize;

        CubePos {
            x: (index % x) as u32,
            y: ((index % xy) / x) as u32,
            z: (index / xy) as u32,
        }
    }
}

/// Position of a cube in the grid.
#[derive(new, Debug, Clone, Copy, PartialEq, Eq, Hash, Default, derive_more::Display)]
#[display("[{x}, {y}, {z}]")]
pub struct CubePos {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

/// Position of a unit (thread) inside its cube.
#[derive(new, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UnitPos {
    /// Index of the plane within the cube.
    pub plane: u32,
    /// Index of the lane within the plane.
    pub lane: u32,
}

impl UnitPos {
    /// Linear index of the unit in the cube.
    pub const fn absolute(&self) -> u32 {
        self.plane * PLANE_DIM + self.lane
    }
}

/// One executing cube.
///
/// Kernels are written in lockstep phases: every unit of the cube runs a phase to completion,
/// then [sync_cube](Cube::sync_cube) acts as the group barrier before the next phase starts.
/// The cube owns the barrier counter that [SharedMemory] uses to detect races.
pub struct Cube {
    /// Position of this cube in the grid.
    pub pos: CubePos,
    /// Shape of the cube.
    pub dim: CubeDim,
    /// Shape of the whole grid.
    pub count: CubeCount,
    sync: Rc<SyncState>,
    shared_bytes: Cell<usize>,
}

impl Cube {
    /// Creates a cube at `pos` with fresh barrier state and an empty shared memory budget.
    pub fn new(pos: CubePos, dim: CubeDim, count: CubeCount) -> Self {
        Self {
            pos,
            dim,
            count,
            sync: Rc::new(SyncState::default()),
            shared_bytes: Cell::new(0),
        }
    }

    /// Iterates over every unit of the cube, plane by plane.
    pub fn units(&self) -> impl Iterator<Item = UnitPos> + use<> {
        let num_planes = self.dim.num_planes();
        (0..num_planes).flat_map(|plane| (0..PLANE_DIM).map(move |lane| UnitPos::new(plane, lane)))
    }

    /// Iterates over the planes of the cube.
    pub fn planes(&self) -> core::ops::Range<u32> {
        0..self.dim.num_planes()
    }

    /// Group barrier: every unit has finished the current phase.
    pub fn sync_cube(&self) {
        self.sync.barrier();
    }

    /// Number of barriers executed so far by this cube.
    pub fn barrier_count(&self) -> u64 {
        self.sync.count()
    }

    /// Allocates a zero-initialized group-shared buffer of `len` elements.
    ///
    /// # Panics
    ///
    /// If the cube's shared memory budget is exceeded. Configs are validated against
    /// [SHARED_MEMORY_BYTES] at setup, so this only fires on a kernel bug.
    pub fn shared_memory<E: Copy + Default>(&self, len: usize) -> SharedMemory<E> {
        let bytes = self.shared_bytes.get() + len * core::mem::size_of::<E>();
        assert!(
            bytes <= SHARED_MEMORY_BYTES,
            "Cube {} requested {bytes} bytes of shared memory, only {SHARED_MEMORY_BYTES} are available",
            self.pos
        );
        self.shared_bytes.set(bytes);

        SharedMemory::new(len, self.sync.clone())
    }
}
