use gemmkit_common::Numeric;
use gemmkit_runtime::ComputeClient;

use super::{BlockMasking, GemvConfig, GemvKernel, GemvMasks, GemvProblem, GemvTKernel, NoMask};
use crate::components::{
    FormattedConfigError, MatmulIdent, MatmulPrecision, MatmulSetupError, check_buffer_len,
    check_launch, cube_count, log_launch,
};

/// Launches an unmasked GEMV.
pub fn launch_gemv<MP: MatmulPrecision>(
    client: &ComputeClient,
    problem: &GemvProblem,
    mat: &[MP::EI],
    vec: &[MP::EI],
    out: &mut [MP::EO],
) -> Result<(), MatmulSetupError> {
    let masks = GemvMasks {
        out: NoMask,
        mat: NoMask,
        vec: NoMask,
    };

    launch_gemv_masked::<MP, NoMask, NoMask>(client, problem, mat, vec, &masks, out)
}

/// Launches a GEMV with block masks on the output and the operands.
///
/// Every enabled mask must use the same block size. Blocks masked out on the output are
/// written as zeros. Blocks masked out on either operand are skipped in the reduction.
pub fn launch_gemv_masked<MP: MatmulPrecision, OutMask: BlockMasking, OpMask: BlockMasking>(
    client: &ComputeClient,
    problem: &GemvProblem,
    mat: &[MP::EI],
    vec: &[MP::EI],
    masks: &GemvMasks<OutMask, OpMask>,
    out: &mut [MP::EO],
) -> Result<(), MatmulSetupError> {
    problem.validate()?;
    check_buffer_len(MatmulIdent::Lhs, mat.len(), problem.matrix_len())?;
    check_buffer_len(MatmulIdent::Rhs, vec.len(), problem.vector_len())?;
    check_buffer_len(MatmulIdent::Out, out.len(), problem.out_len())?;

    let mask_block = validate_masks(problem, masks)?;
    let config = GemvConfig::select(
        problem.transposed,
        problem.in_size,
        problem.out_size,
        mask_block,
    )?;

    let count = cube_count(
        problem.out_size.div_ceil(config.outputs_per_cube()),
        1,
        problem.num_batches(),
    )?;
    let dim = config.cube_dim();
    check_launch(client.properties(), count, dim)?;

    log_launch(
        client,
        || {
            format!(
                "[Matmul] gemv<{}, {}, {}> out={} in={} transposed={} batches={} tiling=({}) mask_block={mask_block:?}",
                MP::EI::NAME,
                MP::EA::NAME,
                MP::EO::NAME,
                problem.out_size,
                problem.in_size,
                problem.transposed,
                problem.num_batches(),
                config.tiling(),
            )
        },
        || format!("[Matmul] {config:?} {problem:?}"),
    );

    match problem.transposed {
        false => {
            let mut kernel = GemvKernel::<MP, OutMask, OpMask> {
                config,
                problem,
                mat,
                vec,
                out,
                masks,
            };
            client.execute(&mut kernel, count, dim);
        }
        true => {
            let mut kernel = GemvTKernel::<MP, OutMask, OpMask> {
                config,
                problem,
                mat,
                vec,
                out,
                masks,
            };
            client.execute(&mut kernel, count, dim);
        }
    }

    Ok(())
}

// Returns the common block size of the enabled masks.
fn validate_masks<OutMask: BlockMasking, OpMask: BlockMasking>(
    problem: &GemvProblem,
    masks: &GemvMasks<OutMask, OpMask>,
) -> Result<Option<usize>, MatmulSetupError> {
    let sizes: Vec<usize> = [
        masks.out.block_size(),
        masks.mat.block_size(),
        masks.vec.block_size(),
    ]
    .into_iter()
    .flatten()
    .collect();

    let Some(&block) = sizes.first() else {
        return Ok(None);
    };

    if block == 0 || sizes.iter().any(|size| *size != block) {
        return Err(FormattedConfigError::new(move || {
            format!("Mismatched GEMV mask block sizes {sizes:?}")
        })
        .into());
    }

    let rank = problem.batch_shape.len();
    let checks: [(&'static str, usize, usize, &[usize]); 3] = [
        (
            "output",
            masks.out.num_elems(),
            masks.out.required_len((1, problem.out_size.div_ceil(block)), &problem.batch_shape),
            masks.out.batch_strides(),
        ),
        (
            "matrix",
            masks.mat.num_elems(),
            masks.mat.required_len(problem.matrix_blocks(block), &problem.batch_shape),
            masks.mat.batch_strides(),
        ),
        (
            "vector",
            masks.vec.num_elems(),
            masks.vec.required_len((1, problem.in_size.div_ceil(block)), &problem.batch_shape),
            masks.vec.batch_strides(),
        ),
    ];

    for (name, len, required, batch_strides) in checks {
        if !batch_strides.is_empty() && batch_strides.len() != rank {
            return Err(FormattedConfigError::new(move || {
                format!("The {name} mask batch strides must have rank {rank}")
            })
            .into());
        }

        if len < required {
            return Err(FormattedConfigError::new(move || {
                format!("The {name} mask has {len} elements, {required} required")
            })
            .into());
        }
    }

    Ok(Some(block))
}
