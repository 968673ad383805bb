use parred_runtime::{Runtime, client::ComputeClient, command::CommandBuffer, server::Handle};
use serde::{Deserialize, Serialize};

use crate::{
    ReduceError, ReduceStrategy, decomposition, interleaved, plane, planner::DecompositionConfig,
    sequential,
};

/// Number of elements reduced by the group-decomposed strategy on the reference device.
pub const DEFAULT_DECOMPOSED_ELEMENTS: u32 = 512;

/// Knobs of the reduction that don't come from the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReduceOptions {
    /// Number of elements the group-decomposed strategy is laid out for.
    #[serde(default = "default_decomposed_elements")]
    pub decomposed_elements: u32,
}

fn default_decomposed_elements() -> u32 {
    DEFAULT_DECOMPOSED_ELEMENTS
}

impl Default for ReduceOptions {
    fn default() -> Self {
        Self {
            decomposed_elements: DEFAULT_DECOMPOSED_ELEMENTS,
        }
    }
}

/// Result of a reduction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReduceOutput {
    /// The total sum.
    pub total: f32,
    /// Number of kernel launches it took.
    pub launches: usize,
}

/// Check that `length` elements can be reduced in place in `working`.
pub fn validate_length(length: u32, working: &Handle) -> Result<(), ReduceError> {
    if !length.is_power_of_two() {
        return Err(ReduceError::InvalidLength { length });
    }

    let needed = length as usize * size_of::<f32>();
    if working.size() < needed {
        return Err(ReduceError::BufferTooSmall {
            length,
            size: working.size(),
        });
    }

    Ok(())
}

pub(crate) fn launch_reduce<R: Runtime>(
    client: &ComputeClient<R::Server>,
    working: &Handle,
    length: u32,
    strategy: ReduceStrategy,
    options: &ReduceOptions,
) -> Result<ReduceOutput, ReduceError> {
    match strategy {
        ReduceStrategy::Interleaved | ReduceStrategy::Sequential => {
            launch_halving::<R>(client, working, length, strategy)
        }
        ReduceStrategy::GroupDecomposed => {
            launch_decomposition::<R>(client, working, length, options)
        }
        ReduceStrategy::SubgroupReduced => launch_plane::<R>(client, working, length),
    }
}

fn launch_halving<R: Runtime>(
    client: &ComputeClient<R::Server>,
    working: &Handle,
    length: u32,
    strategy: ReduceStrategy,
) -> Result<ReduceOutput, ReduceError> {
    let pipeline = client.pipeline(strategy.entry_point())?;

    let mut commands = CommandBuffer::new();
    match strategy {
        ReduceStrategy::Interleaved => {
            interleaved::encode(&mut commands, &pipeline, working, length)
        }
        _ => sequential::encode(&mut commands, &pipeline, working, length),
    }
    let launches = commands.len();

    if !commands.is_empty() {
        client.execute(commands)?;
    }

    let values = client.read_as::<f32>(working)?;
    Ok(ReduceOutput {
        total: values[0],
        launches,
    })
}

fn launch_decomposition<R: Runtime>(
    client: &ComputeClient<R::Server>,
    working: &Handle,
    length: u32,
    options: &ReduceOptions,
) -> Result<ReduceOutput, ReduceError> {
    if length != options.decomposed_elements {
        return Err(ReduceError::LengthMismatch {
            length,
            expected: options.decomposed_elements,
        });
    }

    let pipeline = client.pipeline(ReduceStrategy::GroupDecomposed.entry_point())?;
    let config = DecompositionConfig::generate(
        length,
        &pipeline,
        client.properties().max_shared_memory_bytes,
    )?;

    let mut commands = CommandBuffer::new();
    decomposition::encode(&mut commands, &pipeline, working, &config);
    let launches = commands.len();
    client.execute(commands)?;

    let values = client.read_as::<f32>(working)?;
    Ok(ReduceOutput {
        total: decomposition::fold_partials(&values, &config),
        launches,
    })
}

fn launch_plane<R: Runtime>(
    client: &ComputeClient<R::Server>,
    working: &Handle,
    length: u32,
) -> Result<ReduceOutput, ReduceError> {
    let pipeline = client.pipeline(ReduceStrategy::SubgroupReduced.entry_point())?;
    let total = client.empty(size_of::<f32>());

    let mut commands = CommandBuffer::new();
    plane::encode(&mut commands, &pipeline, working, &total, length);
    let launches = commands.len();
    client.execute(commands)?;

    let total = client.read_as::<f32>(&total)?;
    Ok(ReduceOutput {
        total: total[0],
        launches,
    })
}
