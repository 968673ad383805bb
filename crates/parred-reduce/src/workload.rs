use parred_runtime::{client::ComputeClient, server::ComputeServer, server::Handle};
use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};

/// How the values of a workload are drawn.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueDistribution {
    /// Integers in `0..=5`, exactly representable and summed without rounding error.
    #[default]
    SmallIntegers,
    /// Uniform values in `[0, 1)`.
    Unit,
}

/// The input of a reduction and its host-side reference sum.
#[derive(Debug, Clone, PartialEq)]
pub struct Workload {
    values: Vec<f32>,
    reference: f32,
}

impl Workload {
    /// Draw `length` values from `distribution`. The same seed always gives the same values.
    pub fn generate(length: u32, distribution: ValueDistribution, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let values = (0..length)
            .map(|_| match distribution {
                ValueDistribution::SmallIntegers => rng.random_range(0..=5u32) as f32,
                ValueDistribution::Unit => rng.random::<f32>(),
            })
            .collect();

        Self::from_values(values)
    }

    /// A workload made of the given values.
    pub fn from_values(values: Vec<f32>) -> Self {
        let reference = values.iter().map(|value| *value as f64).sum::<f64>() as f32;
        Self { values, reference }
    }

    /// The values to reduce.
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Number of values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// If there's nothing to reduce.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Sum of the values, accumulated in `f64` on the host.
    pub fn reference(&self) -> f32 {
        self.reference
    }

    /// Upload the values into a fresh working buffer.
    pub fn upload<S: ComputeServer>(&self, client: &ComputeClient<S>) -> Handle {
        client.create_from_slice(&self.values)
    }
}
