//! Parallel sum reduction of a power-of-two number of `f32` elements.
//!
//! Four strategies share the same contract: they reduce the first `length` elements of a
//! device buffer in place and return the total. The halving strategies
//! ([interleaved](ReduceStrategy::Interleaved), [sequential](ReduceStrategy::Sequential))
//! encode one launch per step, the [group-decomposed](ReduceStrategy::GroupDecomposed) one
//! synchronizes a group with barriers inside a single launch and the
//! [subgroup-reduced](ReduceStrategy::SubgroupReduced) one relies on plane sums and an atomic
//! accumulator.

#[macro_use]
extern crate derive_new;

mod error;
mod launch;
mod library;
mod run;
mod strategy;
mod verify;
mod workload;

pub mod decomposition;
pub mod interleaved;
pub mod plane;
pub mod planner;
pub mod sequential;

pub use error::*;
pub use launch::*;
pub use library::*;
pub use run::*;
pub use strategy::*;
pub use verify::*;
pub use workload::*;


use parred_runtime::{Runtime, client::ComputeClient, server::Handle};

/// Entry point for reduce.
///
/// Reduces the first `length` elements of `working` in place. The buffer content is
/// unspecified afterwards, reducing it again doesn't give back the same total. The kernels of
/// [reduction_library] must have been loaded on the client.
pub fn reduce<R: Runtime>(
    client: &ComputeClient<R::Server>,
    working: &Handle,
    length: u32,
    strategy: ReduceStrategy,
    options: &ReduceOptions,
) -> Result<ReduceOutput, ReduceError> {
    let strategy = strategy.validate::<R>(client)?;
    validate_length(length, working)?;

    log::debug!("Reducing {length} elements with the {strategy} strategy");
    launch_reduce::<R>(client, working, length, strategy, options)
}
