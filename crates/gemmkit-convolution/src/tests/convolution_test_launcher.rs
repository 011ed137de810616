use gemmkit_matmul::{
    components::{MatmulPrecision, TilingScheme},
    tests::test_utils::{Sample, assert_equals_approx, matmul_epsilon, to_f64},
};
use gemmkit_runtime::ComputeClient;
use num_traits::Zero;
use pretty_assertions::assert_eq;

use super::test_utils::{conv_cpu_reference, launched};
use crate::{
    components::{ConvAlgorithm, ConvParams},
    launch_conv2d_with,
};

/// Test the correctness of the given algorithm on random data,
/// against a naive CPU implementation over the given problem
pub fn test_convolution_algorithm<MP: MatmulPrecision>(
    client: &ComputeClient,
    params: &ConvParams<2>,
    algorithm: ConvAlgorithm,
    tiling: Option<TilingScheme>,
) {
    let input = MP::EI::sample(params.input_len(), 1234);
    let weight = MP::EI::sample(params.weight_len(), 5678);
    let mut out = vec![MP::EO::zero(); params.out_len()];

    if !launched(launch_conv2d_with::<MP>(
        client, algorithm, tiling, params, &input, &weight, &mut out,
    )) {
        return;
    }

    let expected = conv_cpu_reference(params, &input, &weight);
    let epsilon = matmul_epsilon::<MP>(params.reduction_len());
    if let Err(err) = assert_equals_approx(&out, &expected, epsilon) {
        panic!("{algorithm:?} on {params:?}: {err}");
    }
}

/// Runs `params` through the implicit and the general algorithms on integer data, and checks
/// both match the reference exactly.
pub fn test_algorithms_agree<MP: MatmulPrecision>(
    client: &ComputeClient,
    params: &ConvParams<2>,
    tiling: TilingScheme,
) {
    let input = MP::EI::sample_integers(params.input_len(), 21);
    let weight = MP::EI::sample_integers(params.weight_len(), 22);
    let expected = conv_cpu_reference(params, &input, &weight);

    for algorithm in [ConvAlgorithm::Implicit, ConvAlgorithm::General] {
        let mut out = vec![MP::EO::zero(); params.out_len()];
        if !launched(launch_conv2d_with::<MP>(
            client,
            algorithm,
            Some(tiling),
            params,
            &input,
            &weight,
            &mut out,
        )) {
            return;
        }

        assert_eq!(to_f64(&out), expected, "{algorithm:?}");
    }
}
