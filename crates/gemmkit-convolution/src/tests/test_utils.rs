use gemmkit_common::Numeric;
use gemmkit_matmul::tests::test_utils::panic_on_launch_err;

use crate::components::{ConvParams, ConvSetupError};

/// Handles the result of a launch the way `MATMUL_TEST_MODE` asks. Returns whether the
/// launch succeeded and the output should be checked.
pub fn launched(result: Result<(), ConvSetupError>) -> bool {
    match result {
        Ok(()) => true,
        Err(err) => {
            let msg = format!("Can't launch the test: {err}");
            if panic_on_launch_err() {
                panic!("{msg}");
            }
            println!("{msg}");
            false
        }
    }
}

/// Solves a 2D convolution on the host, in `f64`, straight from its definition.
///
/// Output `(n, oh, ow, o)` sums, over every tap `(th, tw)` and every channel `c` of the
/// group of `o`, the dilated input at `(oh·stride - padding + th·kdil, ..)` times the weight
/// of the tap, mirrored when flipping. Positions between dilated input pixels are zero.
///
/// This is a naive CPU implementation, very slow on large payloads,
/// not designed to be used for other purposes than testing.
pub fn conv_cpu_reference<E: Numeric>(
    params: &ConvParams<2>,
    input: &[E],
    weight: &[E],
) -> Vec<f64> {
    let [out_h, out_w] = params.out_shape;
    let [kh, kw] = params.kernel_shape;
    let channels = params.channels_per_group();
    let filters = params.out_channels_per_group();
    let s_in = &params.in_strides;
    let s_wt = &params.weight_strides;
    let s_out = &params.out_strides;

    let in_coord = |dim: usize, out: usize, tap: usize| -> Option<usize> {
        let dilated = (out * params.stride[dim] + tap * params.kernel_dilation[dim]) as isize
            - params.padding[dim] as isize;
        let idil = params.input_dilation[dim] as isize;
        if dilated < 0 || dilated % idil != 0 {
            return None;
        }
        let coord = (dilated / idil) as usize;
        (coord < params.in_shape[dim]).then_some(coord)
    };
    let weight_tap = |dim: usize, tap: usize| match params.flip {
        true => params.kernel_shape[dim] - 1 - tap,
        false => tap,
    };

    let mut out = vec![0.0; params.out_len()];

    for n in 0..params.batches {
        for oh in 0..out_h {
            for ow in 0..out_w {
                for o in 0..params.out_channels {
                    let group = o / filters;
                    let mut sum = 0.0;

                    for th in 0..kh {
                        let Some(ih) = in_coord(0, oh, th) else {
                            continue;
                        };
                        for tw in 0..kw {
                            let Some(iw) = in_coord(1, ow, tw) else {
                                continue;
                            };
                            let in_offset =
                                n * s_in[0] + ih * s_in[1] + iw * s_in[2] + group * channels;
                            let wt_offset = o * s_wt[0]
                                + weight_tap(0, th) * s_wt[1]
                                + weight_tap(1, tw) * s_wt[2];

                            for c in 0..channels {
                                sum += input[in_offset + c].to_f64()
                                    * weight[wt_offset + c].to_f64();
                            }
                        }
                    }

                    out[n * s_out[0] + oh * s_out[1] + ow * s_out[2] + o] = sum;
                }
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::ConvOptions;
    use pretty_assertions::assert_eq;

    #[test]
    fn reference_of_a_hand_computed_convolution() {
        // One channel, input rows [1 2 3], [4 5 6], [7 8 9], kernel [[1, 0], [0, -1]].
        let params = ConvParams::new(1, 1, 1, [3, 3], [2, 2], &ConvOptions::default()).unwrap();
        let input = [1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0];
        let weight = [1.0f32, 0.0, 0.0, -1.0];

        assert_eq!(conv_cpu_reference(&params, &input, &weight), vec![-4.0; 4]);

        // Flipped, the kernel becomes [[-1, 0], [0, 1]].
        let flipped = ConvOptions::default().with_flip(true);
        let params = ConvParams::new(1, 1, 1, [3, 3], [2, 2], &flipped).unwrap();
        assert_eq!(conv_cpu_reference(&params, &input, &weight), vec![4.0; 4]);
    }

    #[test]
    fn reference_inserts_zeros_between_dilated_pixels() {
        // A 1×2 input dilated by 2 is [a 0 b]; a [1 1] kernel sees a, then b.
        let options = ConvOptions::default().with_input_dilation([1, 2]);
        let params = ConvParams::new(1, 1, 1, [1, 2], [1, 2], &options).unwrap();

        assert_eq!(
            conv_cpu_reference(&params, &[3.0f32, 5.0], &[1.0f32, 1.0]),
            vec![3.0, 5.0]
        );
    }

    #[test]
    fn reference_keeps_groups_apart() {
        // Two groups of one channel: filter 0 sees channel 0 only, filter 1 channel 1 only.
        let options = ConvOptions::default().with_groups(2);
        let params = ConvParams::new(1, 2, 2, [1, 1], [1, 1], &options).unwrap();

        assert_eq!(
            conv_cpu_reference(&params, &[2.0f32, 3.0], &[10.0f32, 100.0]),
            vec![20.0, 300.0]
        );
    }
}
