use gemmkit_common::Numeric;

/// Side of the square matrix fragment multiplied by a plane.
pub const FRAGMENT_SIZE: usize = 8;

/// Consecutive fragment elements held by one lane.
pub const FRAGMENT_ELEMS_PER_LANE: usize = 2;

/// Position `(row, col)` of the first element lane `lane` holds in a fragment. The lane also
/// holds `(row, col + 1)`.
///
/// Every lane of a plane owns a distinct pair, so the 32 lanes cover the 64 elements.
pub fn fragment_coord(lane: u32) -> (usize, usize) {
    let qid = lane / 4;
    let fm = (qid & 4) + ((lane / 2) % 4);
    let fn_ = (qid & 2) * 2 + (lane % 2) * 2;

    (fm as usize, fn_ as usize)
}

/// An 8×8 matrix fragment, held by a whole plane.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Fragment<A> {
    values: [A; FRAGMENT_SIZE * FRAGMENT_SIZE],
}

impl<A: Numeric> Default for Fragment<A> {
    fn default() -> Self {
        Self::zeros()
    }
}

impl<A: Numeric> Fragment<A> {
    pub fn zeros() -> Self {
        Self {
            values: [A::zero(); FRAGMENT_SIZE * FRAGMENT_SIZE],
        }
    }

    pub fn get(&self, row: usize, col: usize) -> A {
        self.values[row * FRAGMENT_SIZE + col]
    }

    pub fn set(&mut self, row: usize, col: usize, value: A) {
        self.values[row * FRAGMENT_SIZE + col] = value;
    }

    /// `self += a·b`.
    pub fn mma(&mut self, a: &Self, b: &Self) {
        for row in 0..FRAGMENT_SIZE {
            for k in 0..FRAGMENT_SIZE {
                let a_rk = a.get(row, k);
                let b_row = &b.values[k * FRAGMENT_SIZE..(k + 1) * FRAGMENT_SIZE];
                let c_row = &mut self.values[row * FRAGMENT_SIZE..(row + 1) * FRAGMENT_SIZE];

                for (c, b) in c_row.iter_mut().zip(b_row) {
                    *c += a_rk * *b;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gemmkit_common::PLANE_DIM;
    use pretty_assertions::assert_eq;

    #[test]
    fn lanes_cover_the_fragment_once() {
        let mut seen = [0u32; FRAGMENT_SIZE * FRAGMENT_SIZE];

        for lane in 0..PLANE_DIM {
            let (row, col) = fragment_coord(lane);
            for e in 0..FRAGMENT_ELEMS_PER_LANE {
                seen[row * FRAGMENT_SIZE + col + e] += 1;
            }
        }

        assert_eq!(seen, [1; FRAGMENT_SIZE * FRAGMENT_SIZE]);
    }

    #[test]
    fn mma_accumulates_the_product() {
        let mut a = Fragment::<f32>::zeros();
        let mut b = Fragment::<f32>::zeros();
        for i in 0..FRAGMENT_SIZE {
            for j in 0..FRAGMENT_SIZE {
                a.set(i, j, (i + j) as f32);
                b.set(i, j, if i == j { 2.0 } else { 0.0 });
            }
        }
        let mut c = Fragment::<f32>::zeros();
        c.set(1, 2, 1.0);

        c.mma(&a, &b);

        assert_eq!(c.get(0, 0), 0.0);
        assert_eq!(c.get(1, 2), 7.0);
        assert_eq!(c.get(7, 7), 28.0);
    }
}
