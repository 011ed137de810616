use core::cell::Cell;
use std::rc::Rc;

/// Barrier counter shared between a cube and the shared memories it allocated.
#[derive(Default, Debug)]
pub(crate) struct SyncState {
    barriers: Cell<u64>,
}

impl SyncState {
    pub(crate) fn barrier(&self) {
        self.barriers.set(self.barriers.get() + 1);
    }

    pub(crate) fn count(&self) -> u64 {
        self.barriers.get()
    }
}

/// What a group-shared buffer is currently being used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Units are writing into the buffer. No unit may read it until a barrier.
    Filling,
    /// The buffer holds a complete tile. No unit may write it until a barrier.
    Ready,
}

/// A group-shared buffer owned by one cube.
///
/// The buffer tracks its [Phase] and the barrier count at its last access. Switching from
/// filling to reading, or from reading to refilling, is only legal once the cube went through a
/// barrier after that access. Anything else is a data race on real hardware and panics here.
#[derive(Debug)]
pub struct SharedMemory<E> {
    data: Vec<E>,
    phase: Cell<Phase>,
    since: Cell<u64>,
    sync: Rc<SyncState>,
}

impl<E: Copy + Default> SharedMemory<E> {
    pub(crate) fn new(len: usize, sync: Rc<SyncState>) -> Self {
        Self {
            data: vec![E::default(); len],
            phase: Cell::new(Phase::Filling),
            since: Cell::new(sync.count()),
            sync,
        }
    }

    /// Number of elements in the buffer.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the buffer has no element.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Current phase of the buffer.
    pub fn phase(&self) -> Phase {
        self.phase.get()
    }

    /// Writes one element.
    ///
    /// # Panics
    ///
    /// If the buffer was read since the last barrier.
    pub fn write(&mut self, index: usize, value: E) {
        self.enter(Phase::Filling);
        self.data[index] = value;
    }

    /// Reads one element.
    ///
    /// # Panics
    ///
    /// If the buffer was written since the last barrier.
    pub fn read(&self, index: usize) -> E {
        self.enter(Phase::Ready);
        self.data[index]
    }

    /// Rewrites one element in place, from the unit that staged it.
    ///
    /// This is a fill-phase access: the buffer must not have been read since the last barrier.
    pub fn update(&mut self, index: usize, op: impl FnOnce(E) -> E) {
        self.enter(Phase::Filling);
        self.data[index] = op(self.data[index]);
    }

    fn enter(&self, phase: Phase) {
        let now = self.sync.count();

        if self.phase.get() == phase {
            self.since.set(now);
            return;
        }

        if now == self.since.get() {
            panic!(
                "Shared memory race: switched from {:?} to {:?} without a barrier",
                self.phase.get(),
                phase
            );
        }

        self.phase.set(phase);
        self.since.set(now);
    }
}

#[cfg(test)]
mod tests {
    use crate::{Cube, CubeCount, CubeDim, CubePos};
    use pretty_assertions::assert_eq;

    use super::*;

    fn cube() -> Cube {
        Cube::new(
            CubePos::default(),
            CubeDim::new_planes(1),
            CubeCount::new(1, 1, 1),
        )
    }

    #[test]
    fn fill_sync_read_sync_refill() {
        let cube = cube();
        let mut smem = cube.shared_memory::<f32>(4);

        smem.write(0, 1.0);
        smem.write(1, 2.0);
        cube.sync_cube();
        assert_eq!(smem.read(0) + smem.read(1), 3.0);
        assert_eq!(smem.phase(), Phase::Ready);

        cube.sync_cube();
        smem.write(0, 5.0);
        assert_eq!(smem.phase(), Phase::Filling);
        cube.sync_cube();
        assert_eq!(smem.read(0), 5.0);
    }

    #[test]
    fn update_stays_in_fill_phase() {
        let cube = cube();
        let mut smem = cube.shared_memory::<f32>(4);

        smem.write(0, 2.0);
        smem.update(0, |v| v * 3.0);
        cube.sync_cube();
        assert_eq!(smem.read(0), 6.0);
    }

    #[test]
    #[should_panic(expected = "Shared memory race")]
    fn read_after_write_without_barrier_panics() {
        let cube = cube();
        let mut smem = cube.shared_memory::<f32>(4);

        smem.write(0, 1.0);
        smem.read(0);
    }

    #[test]
    #[should_panic(expected = "Shared memory race")]
    fn refill_without_barrier_panics() {
        let cube = cube();
        let mut smem = cube.shared_memory::<f32>(4);

        smem.write(0, 1.0);
        cube.sync_cube();
        smem.read(0);
        smem.write(0, 2.0);
    }

    #[test]
    #[should_panic(expected = "Shared memory race")]
    fn late_write_after_barrier_still_needs_barrier() {
        let cube = cube();
        let mut smem = cube.shared_memory::<f32>(4);

        smem.write(0, 1.0);
        cube.sync_cube();
        smem.write(1, 2.0);
        smem.read(1);
    }

    #[test]
    #[should_panic(expected = "Shared memory race")]
    fn read_before_any_fill_panics() {
        let cube = cube();
        let smem = cube.shared_memory::<f32>(4);

        smem.read(0);
    }
}
