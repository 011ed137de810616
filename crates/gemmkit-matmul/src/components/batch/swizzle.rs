use gemmkit_common::{CubeCount, CubePos};

use crate::components::{MatmulAvailabilityError, MatmulSetupError, cube_count};

/// Maps a cube to the output tile it owns.
///
/// Groups of `2^swizzle_log` consecutive cubes along x are spread over consecutive tile rows,
/// so cubes scheduled together share more of their A and B panels. Returns `(tile_x, tile_y)`,
/// which may fall outside the tile grid for the padding cubes of the launch.
pub fn swizzle(pos: CubePos, swizzle_log: u32) -> (usize, usize) {
    let (x, y) = (pos.x as usize, pos.y as usize);
    let tid_x = x >> swizzle_log;
    let tid_y = (y << swizzle_log) + (x & ((1 << swizzle_log) - 1));

    (tid_x, tid_y)
}

/// Cube count covering a `tiles_m × tiles_n` grid once swizzled.
///
/// Fails when the grid does not fit the `u32` cube count.
pub fn swizzled_cube_count(
    tiles_m: usize,
    tiles_n: usize,
    swizzle_log: u32,
    batches: usize,
) -> Result<CubeCount, MatmulSetupError> {
    let Some((tile, x)) = 1usize
        .checked_shl(swizzle_log)
        .and_then(|tile| Some((tile, tiles_n.checked_mul(tile)?)))
    else {
        let saturated = CubeCount::new(u32::MAX, 1, u32::try_from(batches).unwrap_or(u32::MAX));
        return Err(MatmulAvailabilityError::CubeCountTooBig(saturated).into());
    };

    cube_count(x, tiles_m.div_ceil(tile), batches)
}

/// Largest swizzle still useful on `tiles_m` tile rows: past it, the extra cubes of a group
/// only land below the grid.
pub fn clamp_swizzle_log(swizzle_log: u32, tiles_m: usize) -> u32 {
    swizzle_log.min(tiles_m.next_power_of_two().trailing_zeros())
}

/// Default swizzle: only worth it once the tile grid is large in both directions.
pub fn default_swizzle_log(tiles_m: usize, tiles_n: usize) -> u32 {
    match tiles_m >= 8 && tiles_n >= 8 {
        true => 1,
        false => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;

    #[test]
    fn swizzled_grid_covers_every_tile_once() {
        let (tiles_m, tiles_n) = (5, 3);

        for swizzle_log in 0..3 {
            let count = swizzled_cube_count(tiles_m, tiles_n, swizzle_log, 1).unwrap();
            let mut seen = HashSet::new();

            for index in 0..count.num_cubes() {
                let (x, y) = swizzle(count.position(index), swizzle_log);
                if x < tiles_n && y < tiles_m {
                    assert!(seen.insert((x, y)), "tile ({x}, {y}) owned twice");
                }
            }

            assert_eq!(seen.len(), tiles_m * tiles_n);
        }
    }

    #[test]
    fn oversized_swizzle_is_rejected() {
        for swizzle_log in [32, 40, 64, 200] {
            let result = swizzled_cube_count(4, 3, swizzle_log, 1);

            assert!(
                matches!(
                    result,
                    Err(MatmulSetupError::Unavailable(
                        MatmulAvailabilityError::CubeCountTooBig(_)
                    ))
                ),
                "swizzle_log {swizzle_log}: {result:?}"
            );
        }
    }

    #[test]
    fn swizzle_is_clamped_to_the_tile_rows() {
        assert_eq!(clamp_swizzle_log(32, 5), 3);
        assert_eq!(clamp_swizzle_log(1, 8), 1);
        assert_eq!(clamp_swizzle_log(4, 1), 0);

        let count = swizzled_cube_count(5, 3, clamp_swizzle_log(32, 5), 1).unwrap();
        assert_eq!((count.x, count.y, count.z), (24, 1, 1));
    }

    #[test]
    fn no_swizzle_is_identity() {
        assert_eq!(swizzle(CubePos::new(3, 7, 0), 0), (3, 7));
        assert_eq!(swizzle(CubePos::new(3, 7, 0), 1), (1, 15));
    }
}
