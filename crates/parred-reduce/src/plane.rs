use parred_runtime::{
    command::CommandBuffer,
    kernel::{ArgumentKind, Kernel, KernelSignature, Pipeline, Unit},
    server::{Bindings, Handle},
};

use crate::{library, planner::plan};

/// Every plane sums the elements of its lanes, then its first lane adds the plane sum to the
/// total. Planes of every group accumulate concurrently, hence the atomic.
#[derive(Debug)]
pub struct ReduceSum;

impl Kernel for ReduceSum {
    fn name(&self) -> &'static str {
        library::REDUCE_SUM
    }

    fn signature(&self) -> KernelSignature {
        KernelSignature {
            arguments: &[ArgumentKind::Buffer, ArgumentKind::Buffer],
            shared_memories: 0,
            planes: true,
        }
    }

    fn execute(&self, unit: &Unit<'_>) {
        let working = unit.buffer(0);
        let total = unit.buffer(1);

        let sum = unit.plane_sum(working.load(unit.absolute_pos()));
        if unit.unit_pos_plane() == 0 {
            total.atomic_add(0, sum);
        }
    }
}

/// Encode the single launch accumulating `length` elements into `total`, which must be
/// zeroed.
pub fn encode(
    commands: &mut CommandBuffer,
    pipeline: &Pipeline,
    working: &Handle,
    total: &Handle,
    length: u32,
) {
    let bindings = Bindings::new()
        .with_buffer(0, working.binding())
        .with_buffer(1, total.binding());

    commands.encode(
        pipeline,
        bindings,
        plan(length, pipeline.max_group_size()),
    );
}
