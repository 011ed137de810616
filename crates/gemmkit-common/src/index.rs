/// Resolves the offset of the `elem`-th item of an N-d batch in a strided tensor.
///
/// The last dimension varies fastest. A stride of `0` broadcasts the dimension.
pub fn elem_to_loc(elem: usize, shape: &[usize], strides: &[usize]) -> usize {
    let [loc] = elem_to_loc_broadcast(elem, shape, [strides]);
    loc
}

/// Resolves the offsets of the `elem`-th item of an N-d batch in several tensors sharing the
/// same batch shape but not the same strides.
pub fn elem_to_loc_broadcast<const N: usize>(
    mut elem: usize,
    shape: &[usize],
    strides: [&[usize]; N],
) -> [usize; N] {
    let mut locs = [0usize; N];

    for dim in (0..shape.len()).rev() {
        if elem == 0 {
            break;
        }

        let pos = elem % shape[dim];
        elem /= shape[dim];

        for (loc, strides) in locs.iter_mut().zip(strides.iter()) {
            *loc += pos * strides[dim];
        }
    }

    locs
}

/// Row-major strides of a contiguous tensor.
pub fn contiguous_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; shape.len()];
    for i in (0..shape.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * shape[i + 1];
    }
    strides
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn contiguous_batch_resolves_to_flat_index() {
        let shape = [2, 3];
        let strides = contiguous_strides(&shape);

        for elem in 0..6 {
            assert_eq!(elem_to_loc(elem, &shape, &strides), elem);
        }
    }

    #[test]
    fn zero_stride_broadcasts() {
        let shape = [2, 3];
        let [a, b] = elem_to_loc_broadcast(4, &shape, [&[30, 10], &[0, 10]]);

        assert_eq!(a, 30 + 10);
        assert_eq!(b, 10);
    }
}
