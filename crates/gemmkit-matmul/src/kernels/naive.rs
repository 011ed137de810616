//! Naive matmul kernel implementation
//!
//! Each local unit will compute a single element of the output matrix.
use gemmkit_common::{Cube, CubeDim, Numeric, PLANE_DIM};
use gemmkit_runtime::{ComputeClient, CubeKernel};
use num_traits::Zero;

use crate::components::{
    BatchLayout, Epilogue, GemmAddMmParams, MatmulIdent, MatmulPrecision, MatmulProblem,
    MatmulSetupError, MatmulSource, TransformAdd, TransformAxpby, check_buffer_len, check_launch,
    cube_count, log_launch,
    tile::Strided,
};

/// One plane per cube, one lane per output column, one cube row per output row.
pub struct NaiveKernel<'a, MP: MatmulPrecision> {
    pub m: usize,
    pub n: usize,
    pub k: usize,
    pub batch: &'a BatchLayout,
    /// Row and column strides of A and B.
    pub strides_a: (usize, usize),
    pub strides_b: (usize, usize),
    pub batch_stride_a: usize,
    pub batch_stride_b: usize,
    pub a: &'a [MP::EI],
    pub b: &'a [MP::EI],
    pub d: &'a mut [MP::EO],
    pub source: Option<(&'a [MP::EO], GemmAddMmParams)>,
}

impl<MP: MatmulPrecision> NaiveKernel<'_, MP> {
    fn combine<Op: Epilogue<MP::EA>>(
        &self,
        acc: MP::EA,
        c: Strided,
        (row, col): (usize, usize),
        op: Op,
    ) -> MP::EA {
        match self.source {
            Some((data, _)) => op.apply_with(acc, data[c.index(row, col)].cast()),
            None => op.apply(acc),
        }
    }
}

impl<MP: MatmulPrecision> CubeKernel for NaiveKernel<'_, MP> {
    fn execute(&mut self, cube: &Cube) {
        let row = cube.pos.y as usize;
        let z = cube.pos.z as usize;

        let batch_stride_c = self.source.map_or(0, |(_, params)| params.batch_stride_c);
        let [batch_a, batch_b, batch_c] = self.batch.offsets(
            z,
            [self.batch_stride_a, self.batch_stride_b, batch_stride_c],
        );
        let c = match self.source {
            Some((_, params)) => Strided::new(batch_c, params.ldc, params.fdc),
            None => Strided::row_major(0, 0),
        };

        for unit in cube.units() {
            let col = cube.pos.x as usize * PLANE_DIM as usize + unit.lane as usize;
            if row >= self.m || col >= self.n {
                continue;
            }

            let mut acc = MP::EA::zero();
            for i in 0..self.k {
                let lhs = self.a[batch_a + row * self.strides_a.0 + i * self.strides_a.1];
                let rhs = self.b[batch_b + i * self.strides_b.0 + col * self.strides_b.1];
                acc += lhs.cast::<MP::EA>() * rhs.cast::<MP::EA>();
            }

            let value = match self.source {
                Some((_, params)) if params.do_axpby() => {
                    let op = TransformAxpby::new(
                        MP::EA::from_f64(params.alpha),
                        MP::EA::from_f64(params.beta),
                    );
                    self.combine(acc, c, (row, col), op)
                }
                Some(_) => self.combine(acc, c, (row, col), TransformAdd),
                None => acc,
            };

            self.d[z * self.m * self.n + row * self.n + col] = value.cast();
        }
    }
}

/// Launches the naive matmul, optionally fused with a source.
///
/// Slow, but makes no assumption on the problem shape. Used as a reference and as a fallback.
pub fn launch_naive<MP: MatmulPrecision>(
    client: &ComputeClient,
    problem: &MatmulProblem,
    lhs: &[MP::EI],
    rhs: &[MP::EI],
    source: Option<&MatmulSource<'_, MP::EO>>,
    out: &mut [MP::EO],
) -> Result<(), MatmulSetupError> {
    problem.validate()?;
    check_buffer_len(MatmulIdent::Lhs, lhs.len(), problem.num_elems(MatmulIdent::Lhs))?;
    check_buffer_len(MatmulIdent::Rhs, rhs.len(), problem.num_elems(MatmulIdent::Rhs))?;
    check_buffer_len(MatmulIdent::Out, out.len(), problem.num_elems(MatmulIdent::Out))?;

    let batch = match source {
        Some(source) => {
            source.validate(problem)?;
            BatchLayout::from_problem(problem, Some(source.batch_strides()))
        }
        None => BatchLayout::from_problem(problem, None),
    };
    let source = source.map(|source| {
        let batch_stride_c = batch.strides_c.last().copied().unwrap_or(0);
        (source.data, source.params(batch_stride_c))
    });

    let matrix_strides = |ident| {
        let strides = problem.strides(ident);
        let rank = strides.len();
        (strides[rank - 2], strides[rank - 1])
    };

    let count = cube_count(
        problem.n.div_ceil(PLANE_DIM as usize),
        problem.m,
        problem.num_batches(),
    )?;
    let dim = CubeDim::new_planes(1);
    check_launch(client.properties(), count, dim)?;

    log_launch(
        client,
        || {
            format!(
                "[Matmul] naive<{}, {}, {}> m={} n={} k={} batches={} addmm={}",
                MP::EI::NAME,
                MP::EA::NAME,
                MP::EO::NAME,
                problem.m,
                problem.n,
                problem.k,
                problem.num_batches(),
                source.is_some(),
            )
        },
        || format!("[Matmul] {batch:?}"),
    );

    let mut kernel = NaiveKernel::<MP> {
        m: problem.m,
        n: problem.n,
        k: problem.k,
        batch: &batch,
        strides_a: matrix_strides(MatmulIdent::Lhs),
        strides_b: matrix_strides(MatmulIdent::Rhs),
        batch_stride_a: batch.strides_a.last().copied().unwrap_or(0),
        batch_stride_b: batch.strides_b.last().copied().unwrap_or(0),
        a: lhs,
        b: rhs,
        d: out,
        source,
    };
    client.execute(&mut kernel, count, dim);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::MatrixLayout;
    use gemmkit_runtime::config::GlobalConfig;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn client() -> ComputeClient {
        ComputeClient::from_config(Arc::new(GlobalConfig::default()))
    }

    #[test]
    fn naive_matches_hand_computed_product() {
        let problem = MatmulProblem::new(2, 2, 3);
        let lhs = [1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0];
        let rhs = [1.0f32, 0.0, 0.0, 1.0, 1.0, 1.0];
        let mut out = [0.0f32; 4];

        launch_naive::<f32>(&client(), &problem, &lhs, &rhs, None, &mut out).unwrap();

        assert_eq!(out, [4.0, 5.0, 10.0, 11.0]);
    }

    #[test]
    fn naive_reads_col_major_and_bias() {
        let problem = MatmulProblem::new(2, 2, 2)
            .with_layouts(MatrixLayout::ColMajor, MatrixLayout::RowMajor);
        // Column-major [[1, 2], [3, 4]].
        let lhs = [1.0f32, 3.0, 2.0, 4.0];
        let rhs = [1.0f32, 0.0, 0.0, 1.0];
        let bias = [10.0f32, 20.0];
        let source = MatmulSource::bias(&bias, &problem, 1.0, 1.0);
        let mut out = [0.0f32; 4];

        launch_naive::<f32>(&client(), &problem, &lhs, &rhs, Some(&source), &mut out).unwrap();

        assert_eq!(out, [11.0, 22.0, 13.0, 24.0]);
    }
}
