use core::fmt::Display;
use core::time::Duration;
use std::time::Instant;

use parred_runtime::{Runtime, client::ComputeClient};
use serde::{Deserialize, Serialize};

use crate::{
    ReduceError, ReduceOptions, ReduceStrategy, Tolerance, ValueDistribution, Verification,
    Workload, reduce, reduction_library, verify,
};

/// Number of elements of the reference run.
pub const DEFAULT_RUN_LENGTH: u32 = 2048;

/// What a run reduces and how.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// The strategy to run.
    #[serde(default)]
    pub strategy: ReduceStrategy,
    /// Number of elements, a power of two.
    #[serde(default = "default_length")]
    pub length: u32,
    /// How the elements are drawn.
    #[serde(default)]
    pub distribution: ValueDistribution,
    /// Seed of the workload generator.
    #[serde(default)]
    pub seed: u64,
    /// Accepted distance between the total and the reference.
    #[serde(default)]
    pub tolerance: Tolerance,
    /// Options of the reduction.
    #[serde(flatten)]
    pub options: ReduceOptions,
}

fn default_length() -> u32 {
    DEFAULT_RUN_LENGTH
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            strategy: ReduceStrategy::default(),
            length: DEFAULT_RUN_LENGTH,
            distribution: ValueDistribution::default(),
            seed: 0,
            tolerance: Tolerance::default(),
            options: ReduceOptions::default(),
        }
    }
}

/// One reduction from a freshly generated workload to its verification.
///
/// Every execution uploads its own working buffer, nothing is shared between runs.
#[derive(new, Debug, Clone)]
pub struct ReductionRun {
    config: RunConfig,
}

impl ReductionRun {
    /// The configuration of the run.
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Generate the workload described by the configuration and reduce it.
    pub fn execute<R: Runtime>(
        &self,
        client: &ComputeClient<R::Server>,
    ) -> Result<RunReport, ReduceError> {
        let workload = Workload::generate(
            self.config.length,
            self.config.distribution,
            self.config.seed,
        );
        self.execute_workload::<R>(client, &workload)
    }

    /// Reduce a given workload.
    pub fn execute_workload<R: Runtime>(
        &self,
        client: &ComputeClient<R::Server>,
        workload: &Workload,
    ) -> Result<RunReport, ReduceError> {
        let length = workload.len() as u32;
        client.load_library(reduction_library());

        let working = workload.upload(client);
        let start = Instant::now();
        let output = reduce::<R>(
            client,
            &working,
            length,
            self.config.strategy,
            &self.config.options,
        )?;
        let elapsed = start.elapsed();

        let verification = verify(output.total, workload.reference(), &self.config.tolerance);
        log::info!(
            "Reduced {length} elements with the {} strategy in {elapsed:?} ({} launch(es))",
            self.config.strategy,
            output.launches
        );

        Ok(RunReport {
            strategy: self.config.strategy,
            length,
            total: output.total,
            reference: workload.reference(),
            verification,
            launches: output.launches,
            elapsed,
        })
    }
}

/// What happened during a run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    /// The strategy that ran.
    pub strategy: ReduceStrategy,
    /// Number of reduced elements.
    pub length: u32,
    /// Total computed on the device.
    pub total: f32,
    /// Sum computed on the host.
    pub reference: f32,
    /// Comparison of both.
    pub verification: Verification,
    /// Kernel launches used by the strategy.
    pub launches: usize,
    /// Time spent in the reduction, upload and verification excluded.
    pub elapsed: Duration,
}

impl Display for RunReport {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        writeln!(
            f,
            "Strategy: {} | Elements: {} | Launches: {} | Time: {:?}",
            self.strategy, self.length, self.launches, self.elapsed
        )?;
        writeln!(f, "Total: {} | Reference: {}", self.total, self.reference)?;
        write!(f, "{}", self.verification)
    }
}
