use parred_runtime::{
    command::CommandBuffer,
    kernel::{ArgumentKind, Kernel, KernelSignature, Pipeline, Unit},
    server::{Bindings, Handle},
};

use crate::{
    library,
    planner::{InterleavedStep, interleaved_steps, plan},
};

/// `working[i * offset] += working[i * offset + stride]`
#[derive(Debug)]
pub struct InterleavedAddressing;

impl Kernel for InterleavedAddressing {
    fn name(&self) -> &'static str {
        library::INTERLEAVED_ADDRESSING
    }

    fn signature(&self) -> KernelSignature {
        KernelSignature {
            arguments: &[
                ArgumentKind::Buffer,
                ArgumentKind::Scalar,
                ArgumentKind::Scalar,
            ],
            shared_memories: 0,
            planes: false,
        }
    }

    fn execute(&self, unit: &Unit<'_>) {
        let working = unit.buffer(0);
        let stride = unit.scalar(1);
        let offset = unit.scalar(2);

        let index = unit.absolute_pos() * offset;
        working.store(index, working.load(index) + working.load(index + stride));
    }
}

/// Encode a single step of the interleaved strategy.
pub fn encode_step(
    commands: &mut CommandBuffer,
    pipeline: &Pipeline,
    working: &Handle,
    step: InterleavedStep,
) {
    let bindings = Bindings::new()
        .with_buffer(0, working.binding())
        .with_scalar(1, step.stride)
        .with_scalar(2, step.offset);

    commands.encode(
        pipeline,
        bindings,
        plan(step.active_units, pipeline.max_group_size()),
    );
}

/// Encode every step reducing `length` elements into `working[0]`.
///
/// A step reads what the previous one wrote anywhere in the buffer, so each step is its own
/// launch: the device only starts a launch once the previous one completed.
pub fn encode(commands: &mut CommandBuffer, pipeline: &Pipeline, working: &Handle, length: u32) {
    for step in interleaved_steps(length) {
        log::trace!(
            "Interleaved step: stride {}, offset {}, {} unit(s)",
            step.stride,
            step.offset,
            step.active_units
        );
        encode_step(commands, pipeline, working, step);
    }
}
