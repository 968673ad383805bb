use parred_runtime::{
    command::CommandBuffer,
    kernel::{ArgumentKind, Kernel, KernelSignature, Pipeline, Unit},
    server::{Bindings, Handle},
};

use crate::{
    library,
    planner::{plan, sequential_steps},
};

/// `working[i] += working[i + active_units]`
#[derive(Debug)]
pub struct SequentialAddressing;

impl Kernel for SequentialAddressing {
    fn name(&self) -> &'static str {
        library::SEQUENTIAL_ADDRESSING
    }

    fn signature(&self) -> KernelSignature {
        KernelSignature {
            arguments: &[ArgumentKind::Buffer, ArgumentKind::Scalar],
            shared_memories: 0,
            planes: false,
        }
    }

    fn execute(&self, unit: &Unit<'_>) {
        let working = unit.buffer(0);
        let active_units = unit.scalar(1);

        let index = unit.absolute_pos();
        working.store(index, working.load(index) + working.load(index + active_units));
    }
}

/// Encode the step folding the upper `active_units` slots onto the lower ones.
pub fn encode_step(
    commands: &mut CommandBuffer,
    pipeline: &Pipeline,
    working: &Handle,
    active_units: u32,
) {
    let bindings = Bindings::new()
        .with_buffer(0, working.binding())
        .with_scalar(1, active_units);

    commands.encode(
        pipeline,
        bindings,
        plan(active_units, pipeline.max_group_size()),
    );
}

/// Encode every step reducing `length` elements into `working[0]`, one launch per step.
pub fn encode(commands: &mut CommandBuffer, pipeline: &Pipeline, working: &Handle, length: u32) {
    for active_units in sequential_steps(length) {
        log::trace!("Sequential step: {active_units} unit(s)");
        encode_step(commands, pipeline, working, active_units);
    }
}
