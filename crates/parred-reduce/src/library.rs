use parred_runtime::kernel::KernelLibrary;

use crate::{
    decomposition::KernelDecomposition, interleaved::InterleavedAddressing, plane::ReduceSum,
    sequential::SequentialAddressing,
};

/// Entry point of the interleaved addressing strategy.
pub const INTERLEAVED_ADDRESSING: &str = "interleaved_addressing";
/// Entry point of the sequential addressing strategy.
pub const SEQUENTIAL_ADDRESSING: &str = "sequential_addressing";
/// Entry point of the group-decomposed strategy.
pub const KERNEL_DECOMPOSITION: &str = "kernel_decomposition";
/// Entry point of the subgroup-reduced strategy.
pub const REDUCE_SUM: &str = "reduce_sum";

/// The library holding the entry point of every reduce strategy.
pub fn reduction_library() -> KernelLibrary {
    KernelLibrary::new()
        .with_kernel(InterleavedAddressing)
        .with_kernel(SequentialAddressing)
        .with_kernel(KernelDecomposition)
        .with_kernel(ReduceSum)
}
