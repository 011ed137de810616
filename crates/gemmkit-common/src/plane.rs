use crate::PLANE_DIM;

/// Shuffles values down the plane: lane `i` receives the value of lane `i + delta`.
///
/// `values` holds one value per lane. Lanes whose source falls outside the plane keep their
/// own value, matching the hardware behavior.
pub fn plane_shuffle_down<T: Copy>(values: &[T], delta: u32) -> Vec<T> {
    debug_assert_eq!(values.len(), PLANE_DIM as usize);

    let delta = delta as usize;
    (0..values.len())
        .map(|lane| match values.get(lane + delta) {
            Some(value) => *value,
            None => values[lane],
        })
        .collect()
}

/// Tree reduction over groups of `width` consecutive lanes.
///
/// After the call, the first lane of every group holds the sum of its group. Other lanes hold
/// partial sums and must not be used.
pub fn plane_sum_groups<T>(values: &mut [T], width: u32)
where
    T: Copy + core::ops::AddAssign,
{
    let mut delta = width / 2;
    while delta >= 1 {
        let shifted = plane_shuffle_down(values, delta);
        for (value, other) in values.iter_mut().zip(shifted) {
            *value += other;
        }
        delta /= 2;
    }
}

/// Same as [plane_sum_groups], but the lanes of one group are `stride` apart.
///
/// Used when the reduced axis is the slow axis of the plane layout.
pub fn plane_sum_strided<T>(values: &mut [T], count: u32, stride: u32)
where
    T: Copy + core::ops::AddAssign,
{
    let mut step = count / 2;
    while step >= 1 {
        let shifted = plane_shuffle_down(values, stride * step);
        for (value, other) in values.iter_mut().zip(shifted) {
            *value += other;
        }
        step /= 2;
    }
}
