use super::{
    FormattedConfigError, GemmAddMmParams, MatmulIdent, MatmulProblem, MatmulSetupError,
    check_buffer_len,
};

/// The `C` operand of `D = alpha·(A·B) + beta·C`.
///
/// `strides` address C over the output shape, batch dimensions first, then rows and columns.
/// Zero strides broadcast C, which turns a single row of `n` values into a bias.
#[derive(Debug, Clone)]
pub struct MatmulSource<'a, E> {
    pub data: &'a [E],
    pub strides: Vec<usize>,
    pub alpha: f64,
    pub beta: f64,
}

impl<'a, E> MatmulSource<'a, E> {
    /// A C shaped and laid out like the output.
    pub fn contiguous(data: &'a [E], problem: &MatmulProblem, alpha: f64, beta: f64) -> Self {
        Self {
            data,
            strides: problem.strides(MatmulIdent::Source),
            alpha,
            beta,
        }
    }

    /// A row of `n` values added to every row of every batch.
    pub fn bias(data: &'a [E], problem: &MatmulProblem, alpha: f64, beta: f64) -> Self {
        let rank = problem.shape(MatmulIdent::Source).len();
        let mut strides = vec![0; rank];
        strides[rank - 1] = 1;

        Self {
            data,
            strides,
            alpha,
            beta,
        }
    }

    /// Number of elements the strides address for `problem`.
    pub fn required_len(&self, problem: &MatmulProblem) -> usize {
        problem
            .shape(MatmulIdent::Source)
            .iter()
            .zip(self.strides.iter())
            .map(|(shape, stride)| (shape - 1) * stride)
            .sum::<usize>()
            + 1
    }

    /// Checks the strides against the output shape and the buffer against the strides.
    pub fn validate(&self, problem: &MatmulProblem) -> Result<(), MatmulSetupError> {
        let rank = problem.shape(MatmulIdent::Source).len();

        if self.strides.len() != rank {
            let (got, expected) = (self.strides.len(), rank);
            return Err(FormattedConfigError::new(move || {
                format!("Source has {got} strides, the output has rank {expected}")
            })
            .into());
        }

        check_buffer_len(
            MatmulIdent::Source,
            self.data.len(),
            self.required_len(problem),
        )
    }

    /// Batch strides, aligned on the output batch shape.
    pub fn batch_strides(&self) -> &[usize] {
        &self.strides[..self.strides.len() - 2]
    }

    /// Epilogue params once the batch layout is known.
    pub fn params(&self, batch_stride_c: usize) -> GemmAddMmParams {
        let rank = self.strides.len();

        GemmAddMmParams {
            ldc: self.strides[rank - 2],
            fdc: self.strides[rank - 1],
            batch_stride_c,
            alpha: self.alpha,
            beta: self.beta,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn bias_broadcasts_over_rows_and_batches() {
        let problem = MatmulProblem::new(4, 5, 6).with_batches(vec![3], vec![3]);
        let data = [0.0f32; 5];
        let source = MatmulSource::bias(&data, &problem, 1.0, 1.0);

        assert_eq!(source.strides, vec![0, 0, 1]);
        assert_eq!(source.required_len(&problem), 5);
        assert!(source.validate(&problem).is_ok());
        assert_eq!(source.params(0).ldc, 0);
    }

    #[test]
    fn short_source_is_rejected() {
        let problem = MatmulProblem::new(4, 5, 6);
        let data = [0.0f32; 19];
        let source = MatmulSource::contiguous(&data, &problem, 1.0, 0.5);

        assert!(source.validate(&problem).is_err());
    }
}
