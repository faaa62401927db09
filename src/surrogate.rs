//! Feed-forward surrogate network used as a trainable control variate.
//!
//! The architecture is fixed by a list of layer sizes; the weights live in a
//! flat parameter vector so they can be appended to the estimator's
//! hyperparameters and updated by the same optimizer step. Hidden layers use
//! `tanh`; the final layer is linear and scalar.

use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};
use rand_xorshift::XorShiftRng;

use crate::ad::Scalar;

/// Layer sizes of a feed-forward network, e.g. `[dim, hidden, 1]`.
#[derive(Clone, Debug)]
pub struct MlpShape {
    sizes: Vec<usize>,
}

impl MlpShape {
    /// # Panics
    ///
    /// Panics if fewer than two layer sizes are given or the output layer is
    /// not scalar.
    pub fn new(sizes: Vec<usize>) -> Self {
        assert!(
            sizes.len() >= 2,
            "shape mismatch: a network needs an input and an output layer, got {:?}",
            sizes
        );
        assert_eq!(
            *sizes.last().unwrap(),
            1,
            "shape mismatch: the surrogate output layer must be scalar, got {:?}",
            sizes
        );
        MlpShape { sizes }
    }

    /// Input dimension.
    pub fn input_dim(&self) -> usize {
        self.sizes[0]
    }

    /// Length of the flattened weight vector: per layer, an
    /// `in × out` weight block followed by `out` biases.
    pub fn num_params(&self) -> usize {
        self.sizes
            .windows(2)
            .map(|w| (w[0] + 1) * w[1])
            .sum()
    }

    /// Gaussian initialization scaled by `scale`, from a seeded stream.
    pub fn init(&self, scale: f64, seed: u64) -> Vec<f64> {
        let mut rng = XorShiftRng::seed_from_u64(seed);
        (0..self.num_params())
            .map(|_| {
                let n: f64 = StandardNormal.sample(&mut rng);
                n * scale
            })
            .collect()
    }

    /// Evaluate the network on one input vector, returning the scalar output.
    ///
    /// Differentiable end-to-end in both `params` and `input`: everything is
    /// plain [`Scalar`] arithmetic.
    ///
    /// # Panics
    ///
    /// Panics if `params` or `input` does not match the shape.
    pub fn predict<T: Scalar>(&self, params: &[T], input: &[T]) -> T {
        assert_eq!(
            params.len(),
            self.num_params(),
            "shape mismatch: {} surrogate weights for a {:?} network expecting {}",
            params.len(),
            self.sizes,
            self.num_params()
        );
        assert_eq!(
            input.len(),
            self.sizes[0],
            "shape mismatch: surrogate input has length {}, network expects {}",
            input.len(),
            self.sizes[0]
        );

        let mut activations: Vec<T> = input.to_vec();
        let mut offset = 0;
        let last = self.sizes.len() - 2;

        for (layer, w) in self.sizes.windows(2).enumerate() {
            let (n_in, n_out) = (w[0], w[1]);
            let weights = &params[offset..offset + n_in * n_out];
            let biases = &params[offset + n_in * n_out..offset + (n_in + 1) * n_out];
            offset += (n_in + 1) * n_out;

            let mut outputs = Vec::with_capacity(n_out);
            for j in 0..n_out {
                let mut acc = biases[j];
                for (i, &a) in activations.iter().enumerate() {
                    acc = acc + a * weights[i * n_out + j];
                }
                outputs.push(if layer == last { acc } else { acc.tanh() });
            }
            activations = outputs;
        }

        activations[0]
    }
}
