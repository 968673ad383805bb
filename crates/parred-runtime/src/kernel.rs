use core::fmt::{Debug, Display};
use std::sync::Arc;

use hashbrown::HashMap;
use thiserror::Error;

use crate::{
    memory::Memory,
    sync::{GroupBarrier, PlaneSync},
};

/// Kind of a kernel argument slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgumentKind {
    /// A device buffer.
    Buffer,
    /// An inline `u32` scalar.
    Scalar,
}

impl Display for ArgumentKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ArgumentKind::Buffer => f.write_str("buffer"),
            ArgumentKind::Scalar => f.write_str("scalar"),
        }
    }
}

/// Bindings a kernel entry point expects, by index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelSignature {
    /// Argument slots, indexed like the entry point parameters.
    pub arguments: &'static [ArgumentKind],
    /// Number of group-shared memory slots.
    pub shared_memories: u32,
    /// If the kernel uses plane (subgroup) primitives.
    pub planes: bool,
}

/// A compiled kernel entry point.
///
/// `execute` is the body of a single work-item. The device runs it once per work-item of the
/// grid, with every lane of a group alive at the same time so that [Unit::sync_units] and
/// [Unit::plane_sum] behave like their hardware counterparts.
pub trait Kernel: Send + Sync + Debug + 'static {
    /// Name of the entry point in the kernel library.
    fn name(&self) -> &'static str;

    /// Bindings expected by the entry point.
    fn signature(&self) -> KernelSignature;

    /// Run the kernel body for one work-item.
    fn execute(&self, unit: &Unit<'_>);
}

/// Argument resolved by the device for a launch.
#[derive(Debug, Clone)]
pub enum KernelArgument {
    /// A device allocation.
    Buffer(Arc<Memory>),
    /// An inline scalar.
    Scalar(u32),
}

/// Where a work-item sits in the launch.
#[derive(new, Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitPosition {
    /// Index of the work-item in the whole grid.
    pub absolute_pos: u32,
    /// Index of the work-item in its group.
    pub unit_pos: u32,
    /// Index of the group in the grid.
    pub group_pos: u32,
    /// Number of work-items in this group. The last group of a grid can be partial.
    pub group_size: u32,
    /// Number of work-items in the grid.
    pub grid_size: u32,
    /// Width of a plane on the device.
    pub plane_dim: u32,
    /// Index of the plane in the group.
    pub plane_pos: u32,
    /// Index of the work-item in its plane.
    pub unit_pos_plane: u32,
}

impl UnitPosition {
    /// Position of the `unit_pos`-th work-item of group `group_pos`.
    pub fn in_group(
        unit_pos: u32,
        group_pos: u32,
        group_dim: u32,
        group_size: u32,
        grid_size: u32,
        plane_dim: u32,
    ) -> Self {
        let plane_dim = plane_dim.max(1);
        Self::new(
            group_pos * group_dim + unit_pos,
            unit_pos,
            group_pos,
            group_size,
            grid_size,
            plane_dim,
            unit_pos / plane_dim,
            unit_pos % plane_dim,
        )
    }
}

/// Execution context of one work-item.
#[derive(new, Debug)]
pub struct Unit<'a> {
    position: UnitPosition,
    arguments: &'a [Option<KernelArgument>],
    shared: &'a [Memory],
    barrier: &'a GroupBarrier,
    plane: Option<&'a PlaneSync>,
}

impl Unit<'_> {
    /// Index of the work-item in the whole grid.
    pub fn absolute_pos(&self) -> u32 {
        self.position.absolute_pos
    }

    /// Index of the work-item in its group.
    pub fn unit_pos(&self) -> u32 {
        self.position.unit_pos
    }

    /// Index of the group in the grid.
    pub fn group_pos(&self) -> u32 {
        self.position.group_pos
    }

    /// Number of work-items in this group.
    pub fn group_size(&self) -> u32 {
        self.position.group_size
    }

    /// Number of work-items in the grid.
    pub fn grid_size(&self) -> u32 {
        self.position.grid_size
    }

    /// Width of a plane on the device.
    pub fn plane_dim(&self) -> u32 {
        self.position.plane_dim
    }

    /// Index of the plane in the group.
    pub fn plane_pos(&self) -> u32 {
        self.position.plane_pos
    }

    /// Index of the work-item in its plane.
    pub fn unit_pos_plane(&self) -> u32 {
        self.position.unit_pos_plane
    }

    /// The device buffer bound at `index`.
    ///
    /// # Panics
    ///
    /// If no buffer is bound at `index`. Launches are validated against the kernel signature,
    /// so this only happens when a kernel reads a slot it didn't declare.
    pub fn buffer(&self, index: u32) -> &Memory {
        match self.arguments.get(index as usize) {
            Some(Some(KernelArgument::Buffer(memory))) => memory,
            _ => panic!("No buffer bound at index {index}"),
        }
    }

    /// The inline scalar bound at `index`.
    ///
    /// # Panics
    ///
    /// If no scalar is bound at `index`.
    pub fn scalar(&self, index: u32) -> u32 {
        match self.arguments.get(index as usize) {
            Some(Some(KernelArgument::Scalar(value))) => *value,
            _ => panic!("No scalar bound at index {index}"),
        }
    }

    /// The group-shared memory at `index`.
    ///
    /// # Panics
    ///
    /// If no shared memory is declared at `index`.
    pub fn shared(&self, index: u32) -> &Memory {
        match self.shared.get(index as usize) {
            Some(memory) => memory,
            None => panic!("No shared memory declared at index {index}"),
        }
    }

    /// Wait until every work-item of the group reached this point.
    ///
    /// Writes to shared and global memory made before the barrier are visible to every
    /// work-item of the group after it.
    pub fn sync_units(&self) {
        self.barrier.wait();
    }

    /// Sum `value` over the plane of this work-item.
    ///
    /// # Panics
    ///
    /// If the kernel didn't declare plane usage in its signature.
    pub fn plane_sum(&self, value: f32) -> f32 {
        match self.plane {
            Some(plane) => plane.sum(self.position.unit_pos_plane, value),
            None => panic!("Plane primitives used without being declared in the signature"),
        }
    }
}

/// Error raised when building a compute pipeline.
#[derive(Error, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// The library has no entry point with that name.
    #[error("Failed to find the kernel function `{name}` in the kernel library")]
    KernelNotFound {
        /// The requested entry point.
        name: String,
    },

    /// The kernel can't run on this device.
    #[error("Can't create a compute pipeline for `{name}`\nCaused by:\n  {reason}")]
    InvalidSignature {
        /// The entry point.
        name: String,
        /// Why the device rejected it.
        reason: String,
    },
}

impl Debug for PipelineError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_fmt(format_args!("{self}"))
    }
}

/// A set of named kernel entry points, the host-side equivalent of a compiled shader library.
#[derive(Default, Clone, Debug)]
pub struct KernelLibrary {
    kernels: HashMap<&'static str, Arc<dyn Kernel>>,
}

impl KernelLibrary {
    /// Create an empty library.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a kernel, replacing any entry point with the same name.
    pub fn register<K: Kernel>(&mut self, kernel: K) {
        self.kernels.insert(kernel.name(), Arc::new(kernel));
    }

    /// Builder flavour of [KernelLibrary::register].
    pub fn with_kernel<K: Kernel>(mut self, kernel: K) -> Self {
        self.register(kernel);
        self
    }

    /// Add every entry point of `other`.
    pub fn extend(&mut self, other: KernelLibrary) {
        self.kernels.extend(other.kernels);
    }

    /// Lookup an entry point.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Kernel>> {
        self.kernels.get(name).cloned()
    }

    /// Sorted names of every entry point.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.kernels.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

/// A kernel entry point validated for a device, with the capabilities the host needs to size
/// its launches.
#[derive(Clone, Debug)]
pub struct Pipeline {
    kernel: Arc<dyn Kernel>,
    max_group_size: u32,
    plane_dim: u32,
}

impl Pipeline {
    /// Create a pipeline. Only devices should call this, after validating the kernel.
    pub fn new(kernel: Arc<dyn Kernel>, max_group_size: u32, plane_dim: u32) -> Self {
        Self {
            kernel,
            max_group_size,
            plane_dim,
        }
    }

    /// Name of the entry point.
    pub fn name(&self) -> &'static str {
        self.kernel.name()
    }

    /// Bindings expected by the entry point.
    pub fn signature(&self) -> KernelSignature {
        self.kernel.signature()
    }

    /// Largest group the pipeline can be launched with.
    pub fn max_group_size(&self) -> u32 {
        self.max_group_size
    }

    /// Number of lanes executing in lock-step for this pipeline.
    pub fn plane_dim(&self) -> u32 {
        self.plane_dim
    }

    /// The kernel behind the pipeline.
    pub fn kernel(&self) -> &Arc<dyn Kernel> {
        &self.kernel
    }
}
