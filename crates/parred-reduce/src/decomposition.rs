use parred_runtime::{
    command::CommandBuffer,
    kernel::{ArgumentKind, Kernel, KernelSignature, Pipeline, Unit},
    server::{Bindings, Handle},
};

use crate::{library, planner::DecompositionConfig};

/// Tree reduction of a group slice in shared memory.
///
/// The group at `group_pos` owns the `2 * group_size` elements starting at
/// `group_pos * 2 * group_size`. Every work-item folds two of them on load, then half of the
/// remaining lanes fold a partner slot at each step, with a barrier between steps. Lane 0
/// writes the result to the first slot of the slice, which no other group reads.
#[derive(Debug)]
pub struct KernelDecomposition;

impl Kernel for KernelDecomposition {
    fn name(&self) -> &'static str {
        library::KERNEL_DECOMPOSITION
    }

    fn signature(&self) -> KernelSignature {
        KernelSignature {
            arguments: &[ArgumentKind::Buffer],
            shared_memories: 1,
            planes: false,
        }
    }

    fn execute(&self, unit: &Unit<'_>) {
        let working = unit.buffer(0);
        let shared = unit.shared(0);
        let group_width = unit.group_size();
        let lane = unit.unit_pos();

        let start = unit.group_pos() * 2 * group_width;
        let index = start + lane;
        shared.store(lane, working.load(index) + working.load(index + group_width));
        unit.sync_units();

        let mut active = group_width / 2;
        while active > 0 {
            if lane < active {
                shared.store(lane, shared.load(lane) + shared.load(lane + active));
            }
            unit.sync_units();
            active /= 2;
        }

        if lane == 0 {
            working.store(start, shared.load(0));
        }
    }
}

/// Encode the single decomposition launch.
pub fn encode(
    commands: &mut CommandBuffer,
    pipeline: &Pipeline,
    working: &Handle,
    config: &DecompositionConfig,
) {
    log::trace!(
        "Decomposition: {} group(s) of {} unit(s) for {} elements",
        config.groups,
        config.group_width,
        config.elements
    );
    let bindings = Bindings::new()
        .with_buffer(0, working.binding())
        .with_shared_memory(0, config.shared_memory_size());

    commands.encode(pipeline, bindings, config.dispatch());
}

/// Fold the group partial sums, in group order.
pub fn fold_partials(working: &[f32], config: &DecompositionConfig) -> f32 {
    (0..config.groups)
        .map(|group_pos| working[config.partial_index(group_pos) as usize])
        .sum()
}
