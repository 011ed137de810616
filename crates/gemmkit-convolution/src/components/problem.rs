use gemmkit_common::index::contiguous_strides;

use super::ConvSetupError;

/// How the kernel slides over the input, per spatial dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvOptions<const N: usize> {
    pub stride: [usize; N],
    /// Zeros added on both sides of every spatial dimension.
    pub padding: [usize; N],
    /// Spacing between kernel taps.
    pub kernel_dilation: [usize; N],
    /// Spacing between input pixels. Values above one insert `idil - 1` zeros between
    /// neighbouring pixels, as in a transposed convolution.
    pub input_dilation: [usize; N],
    /// Channels and filters are split in that many independent groups.
    pub groups: usize,
    /// Apply the kernel mirrored along every spatial dimension (a true convolution) instead
    /// of as a cross-correlation.
    pub flip: bool,
}

impl<const N: usize> Default for ConvOptions<N> {
    fn default() -> Self {
        Self {
            stride: [1; N],
            padding: [0; N],
            kernel_dilation: [1; N],
            input_dilation: [1; N],
            groups: 1,
            flip: false,
        }
    }
}

impl<const N: usize> ConvOptions<N> {
    pub fn with_stride(mut self, stride: [usize; N]) -> Self {
        self.stride = stride;
        self
    }

    pub fn with_padding(mut self, padding: [usize; N]) -> Self {
        self.padding = padding;
        self
    }

    pub fn with_kernel_dilation(mut self, dilation: [usize; N]) -> Self {
        self.kernel_dilation = dilation;
        self
    }

    pub fn with_input_dilation(mut self, dilation: [usize; N]) -> Self {
        self.input_dilation = dilation;
        self
    }

    pub fn with_groups(mut self, groups: usize) -> Self {
        self.groups = groups;
        self
    }

    pub fn with_flip(mut self, flip: bool) -> Self {
        self.flip = flip;
        self
    }
}

/// A channels-last convolution with `N` spatial dimensions.
///
/// The input is `[batches, in_shape.., in_channels]`, the weights are
/// `[out_channels, kernel_shape.., in_channels / groups]` and the output is
/// `[batches, out_shape.., out_channels]`, all contiguous.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvParams<const N: usize> {
    pub batches: usize,
    pub in_channels: usize,
    pub out_channels: usize,
    pub in_shape: [usize; N],
    pub kernel_shape: [usize; N],
    pub out_shape: [usize; N],
    pub stride: [usize; N],
    pub padding: [usize; N],
    pub kernel_dilation: [usize; N],
    pub input_dilation: [usize; N],
    pub in_strides: Vec<usize>,
    pub weight_strides: Vec<usize>,
    pub out_strides: Vec<usize>,
    pub groups: usize,
    pub flip: bool,
}

/// Size of one output dimension, `None` when the dilated kernel doesn't fit in the padded,
/// dilated input.
pub fn conv_out_size(
    in_size: usize,
    kernel_size: usize,
    stride: usize,
    padding: usize,
    kernel_dilation: usize,
    input_dilation: usize,
) -> Option<usize> {
    let in_dilated = (in_size - 1) * input_dilation + 1;
    let kernel_extent = kernel_dilation * (kernel_size - 1) + 1;
    let padded = in_dilated + 2 * padding;

    (kernel_extent <= padded).then(|| (padded - kernel_extent) / stride + 1)
}

impl<const N: usize> ConvParams<N> {
    /// Validates the geometry and computes the output shape and the contiguous strides.
    pub fn new(
        batches: usize,
        in_channels: usize,
        out_channels: usize,
        in_shape: [usize; N],
        kernel_shape: [usize; N],
        options: &ConvOptions<N>,
    ) -> Result<Self, ConvSetupError> {
        let sizes = [batches, in_channels, out_channels, options.groups];
        if sizes.contains(&0) {
            return Err(ConvSetupError::Geometry(format!(
                "Empty convolution: batches={batches} in_channels={in_channels} \
                 out_channels={out_channels} groups={}",
                options.groups
            )));
        }
        for (name, values) in [
            ("in_shape", &in_shape),
            ("kernel_shape", &kernel_shape),
            ("stride", &options.stride),
            ("kernel_dilation", &options.kernel_dilation),
            ("input_dilation", &options.input_dilation),
        ] {
            if values.contains(&0) {
                return Err(ConvSetupError::Geometry(format!(
                    "{name} must be positive, got {values:?}"
                )));
            }
        }

        let groups = options.groups;
        if in_channels % groups != 0 || out_channels % groups != 0 {
            return Err(ConvSetupError::Geometry(format!(
                "{groups} groups must divide both {in_channels} input and {out_channels} output \
                 channels"
            )));
        }

        let mut out_shape = [0; N];
        for i in 0..N {
            out_shape[i] = conv_out_size(
                in_shape[i],
                kernel_shape[i],
                options.stride[i],
                options.padding[i],
                options.kernel_dilation[i],
                options.input_dilation[i],
            )
            .ok_or_else(|| {
                ConvSetupError::Geometry(format!(
                    "Kernel {kernel_shape:?} dilated by {:?} doesn't fit in input {in_shape:?} \
                     dilated by {:?} and padded by {:?}",
                    options.kernel_dilation, options.input_dilation, options.padding
                ))
            })?;
        }

        let shape_of = |lead: usize, spatial: &[usize; N], last: usize| {
            let mut shape = Vec::with_capacity(N + 2);
            shape.push(lead);
            shape.extend_from_slice(spatial);
            shape.push(last);
            shape
        };

        Ok(Self {
            batches,
            in_channels,
            out_channels,
            in_shape,
            kernel_shape,
            out_shape,
            stride: options.stride,
            padding: options.padding,
            kernel_dilation: options.kernel_dilation,
            input_dilation: options.input_dilation,
            in_strides: contiguous_strides(&shape_of(batches, &in_shape, in_channels)),
            weight_strides: contiguous_strides(&shape_of(
                out_channels,
                &kernel_shape,
                in_channels / groups,
            )),
            out_strides: contiguous_strides(&shape_of(batches, &out_shape, out_channels)),
            groups,
            flip: options.flip,
        })
    }

    /// Input channels seen by one group.
    pub fn channels_per_group(&self) -> usize {
        self.in_channels / self.groups
    }

    /// Filters of one group.
    pub fn out_channels_per_group(&self) -> usize {
        self.out_channels / self.groups
    }

    /// Output pixels over all batches, the `M` of the GEMM.
    pub fn out_pixels(&self) -> usize {
        self.batches * self.out_shape.iter().product::<usize>()
    }

    /// Taps of the kernel.
    pub fn kernel_taps(&self) -> usize {
        self.kernel_shape.iter().product()
    }

    /// Reduction length of one group, the `K` of the GEMM.
    pub fn reduction_len(&self) -> usize {
        self.kernel_taps() * self.channels_per_group()
    }

    pub fn input_len(&self) -> usize {
        self.batches * self.in_shape.iter().product::<usize>() * self.in_channels
    }

    pub fn weight_len(&self) -> usize {
        self.out_channels * self.reduction_len()
    }

    pub fn out_len(&self) -> usize {
        self.out_pixels() * self.out_channels
    }

    /// Whether the input needs zeros inserted between its pixels.
    pub fn is_input_dilated(&self) -> bool {
        self.input_dilation.iter().any(|&d| d != 1)
    }
}

impl ConvParams<1> {
    /// The same convolution seen as a 2D one over a single row.
    pub fn as_conv2d(&self) -> ConvParams<2> {
        let lift = |values: [usize; 1], fill: usize| [fill, values[0]];
        let lift_strides = |strides: &[usize]| {
            let mut out = strides.to_vec();
            out.insert(1, strides[0]);
            out
        };

        ConvParams {
            batches: self.batches,
            in_channels: self.in_channels,
            out_channels: self.out_channels,
            in_shape: lift(self.in_shape, 1),
            kernel_shape: lift(self.kernel_shape, 1),
            out_shape: lift(self.out_shape, 1),
            stride: lift(self.stride, 1),
            padding: lift(self.padding, 0),
            kernel_dilation: lift(self.kernel_dilation, 1),
            input_dilation: lift(self.input_dilation, 1),
            in_strides: lift_strides(&self.in_strides),
            weight_strides: lift_strides(&self.weight_strides),
            out_strides: lift_strides(&self.out_strides),
            groups: self.groups,
            flip: self.flip,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn output_shape_follows_dilated_extents() {
        assert_eq!(conv_out_size(7, 3, 1, 0, 1, 1), Some(5));
        assert_eq!(conv_out_size(7, 3, 2, 1, 1, 1), Some(4));
        assert_eq!(conv_out_size(7, 3, 1, 0, 2, 1), Some(3));
        // 4 pixels dilated by 2 span 7.
        assert_eq!(conv_out_size(4, 3, 1, 0, 1, 2), Some(5));
        assert_eq!(conv_out_size(2, 5, 1, 1, 1, 1), None);
    }

    #[test]
    fn strides_are_channels_last() {
        let options = ConvOptions::default().with_groups(2).with_padding([1, 1]);
        let params = ConvParams::new(2, 8, 6, [5, 7], [3, 3], &options).unwrap();

        assert_eq!(params.out_shape, [5, 7]);
        assert_eq!(params.in_strides, vec![5 * 7 * 8, 7 * 8, 8, 1]);
        assert_eq!(params.weight_strides, vec![3 * 3 * 4, 3 * 4, 4, 1]);
        assert_eq!(params.out_strides, vec![5 * 7 * 6, 7 * 6, 6, 1]);
        assert_eq!(params.reduction_len(), 36);
        assert_eq!(params.out_pixels(), 70);
        assert_eq!(params.weight_len(), 6 * 36);
    }

    #[test]
    fn invalid_geometry_is_rejected() {
        let default = ConvOptions::default();

        assert!(matches!(
            ConvParams::new(1, 6, 4, [5, 5], [3, 3], &default.with_groups(4)),
            Err(ConvSetupError::Geometry(_))
        ));
        assert!(matches!(
            ConvParams::new(1, 4, 4, [2, 2], [3, 3], &default),
            Err(ConvSetupError::Geometry(_))
        ));
        assert!(matches!(
            ConvParams::new(1, 4, 4, [5, 5], [3, 3], &default.with_stride([0, 1])),
            Err(ConvSetupError::Geometry(_))
        ));
        assert!(matches!(
            ConvParams::new(0, 4, 4, [5, 5], [3, 3], &default),
            Err(ConvSetupError::Geometry(_))
        ));
    }

    #[test]
    fn conv1d_is_a_single_row() {
        let options = ConvOptions::default().with_stride([2]).with_padding([1]);
        let params = ConvParams::new(3, 4, 5, [9], [3], &options).unwrap();
        let params_2d = params.as_conv2d();

        assert_eq!(params.out_shape, [5]);
        assert_eq!(params_2d.out_shape, [1, 5]);
        assert_eq!(params_2d.in_strides, vec![36, 36, 4, 1]);
        assert_eq!(params_2d.weight_strides, vec![12, 12, 4, 1]);
        assert_eq!(params_2d.padding, [0, 1]);
        assert_eq!(params_2d.out_len(), params.out_len());
    }
}
