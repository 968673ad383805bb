use core::fmt::{Debug, Display};
use core::time::Duration;
use std::collections::BTreeMap;

use thiserror::Error;

use crate::{
    command::{CommandBuffer, Submission},
    config::device::DeviceConfig,
    id::{BindingRef, HandleRef},
    kernel::{ArgumentKind, KernelLibrary, Pipeline, PipelineError},
    storage_id_type,
};

storage_id_type!(HandleId);

/// Server handle containing the id of a device allocation.
#[derive(Clone, Debug)]
pub struct Handle {
    memory: HandleRef<HandleId>,
    size: usize,
}

impl Handle {
    /// Create a new handle. Only servers should call this when allocating.
    pub fn new(id: HandleId, size: usize) -> Self {
        Self {
            memory: HandleRef::new(id),
            size,
        }
    }

    /// The id of the allocation.
    pub fn id(&self) -> HandleId {
        *self.memory.id()
    }

    /// Size of the allocation in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Convert the handle into a [binding](Binding) for a launch.
    pub fn binding(&self) -> Binding {
        Binding {
            memory: self.memory.binding(),
            size: self.size,
        }
    }

    /// If an outstanding launch still holds a binding to this allocation.
    pub fn is_bound(&self) -> bool {
        self.memory.is_bound()
    }

    /// If the server is the only owner left.
    pub fn is_free(&self) -> bool {
        self.memory.is_free()
    }
}

/// Binding of a [handle](Handle) to a launch. The allocation is considered in use until every
/// binding is dropped.
#[derive(Clone, Debug)]
pub struct Binding {
    memory: BindingRef<HandleId>,
    size: usize,
}

impl Binding {
    /// The id of the bound allocation.
    pub fn id(&self) -> HandleId {
        *self.memory.id()
    }

    /// Size of the bound allocation in bytes.
    pub fn size(&self) -> usize {
        self.size
    }
}

/// A bound argument.
#[derive(Clone, Debug)]
pub enum Argument {
    /// A device buffer.
    Buffer(Binding),
    /// An inline scalar.
    Scalar(u32),
}

impl Argument {
    /// The kind of slot the argument fills.
    pub fn kind(&self) -> ArgumentKind {
        match self {
            Argument::Buffer(_) => ArgumentKind::Buffer,
            Argument::Scalar(_) => ArgumentKind::Scalar,
        }
    }
}

/// Arguments of a launch: buffers and inline scalars share one index space, group-shared
/// memories have their own.
#[derive(Clone, Debug, Default)]
pub struct Bindings {
    /// Buffers and scalars by index.
    pub arguments: BTreeMap<u32, Argument>,
    /// Group-shared memory lengths in bytes, by index.
    pub shared_memories: BTreeMap<u32, usize>,
}

impl Bindings {
    /// Create an empty bindings table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a buffer at `index`.
    pub fn with_buffer(mut self, index: u32, binding: Binding) -> Self {
        self.arguments.insert(index, Argument::Buffer(binding));
        self
    }

    /// Bind an inline scalar at `index`.
    pub fn with_scalar(mut self, index: u32, value: u32) -> Self {
        self.arguments.insert(index, Argument::Scalar(value));
        self
    }

    /// Request `size` bytes of group-shared memory at `index`.
    pub fn with_shared_memory(mut self, index: u32, size: usize) -> Self {
        self.shared_memories.insert(index, size);
        self
    }

    /// Total group-shared memory requested, in bytes.
    pub fn shared_memory_size(&self) -> usize {
        self.shared_memories.values().sum()
    }
}

/// Shape of a launch, in "dispatch threads" semantics: `grid_size` work-items split into
/// groups of `group_size`, the last group being partial when the sizes don't divide.
#[derive(new, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dispatch {
    /// Total number of work-items.
    pub grid_size: u32,
    /// Number of work-items per group.
    pub group_size: u32,
}

impl Dispatch {
    /// Number of groups, counting a partial last group.
    pub fn group_count(&self) -> u32 {
        self.grid_size.div_ceil(self.group_size.max(1))
    }

    /// Number of work-items in the group at `group_pos`.
    pub fn lanes_in_group(&self, group_pos: u32) -> u32 {
        let start = group_pos * self.group_size;
        self.group_size.min(self.grid_size.saturating_sub(start))
    }
}

impl Display for Dispatch {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "grid {} / group {}", self.grid_size, self.group_size)
    }
}

/// Capabilities of a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HardwareProperties {
    /// Maximum number of work-items in a group.
    pub max_group_size: u32,
    /// Number of lanes executing in lock-step.
    pub plane_dim: u32,
    /// If plane primitives are supported.
    pub subgroups: bool,
    /// Maximum group-shared memory per group, in bytes.
    pub max_shared_memory_bytes: usize,
    /// Maximum number of argument slots.
    pub max_bindings: u32,
}

impl From<&DeviceConfig> for HardwareProperties {
    fn from(config: &DeviceConfig) -> Self {
        Self {
            max_group_size: config.max_group_size,
            plane_dim: config.plane_dim,
            subgroups: config.subgroups && config.plane_dim > 0,
            max_shared_memory_bytes: config.max_shared_memory_bytes,
            max_bindings: config.max_bindings,
        }
    }
}

/// Kernel Launch Errors.
#[derive(Error, Clone, PartialEq, Eq)]
pub enum LaunchError {
    /// Too many resources were requested.
    #[error("Too many resources were requested during launch\n{0}")]
    TooManyResources(#[from] ResourceLimitError),

    /// A slot declared by the kernel isn't bound, or is bound with the wrong kind.
    #[error("Kernel `{kernel}` expects a {expected} at index {index}")]
    MissingBinding {
        /// The entry point.
        kernel: &'static str,
        /// The argument index.
        index: u32,
        /// What the kernel expects there.
        expected: ArgumentKind,
    },

    /// A group-shared memory declared by the kernel has no length.
    #[error("Kernel `{kernel}` expects a shared memory at index {index}")]
    MissingSharedMemory {
        /// The entry point.
        kernel: &'static str,
        /// The shared memory index.
        index: u32,
    },

    /// The launch shape is empty.
    #[error("Invalid launch shape for `{kernel}`: {dispatch}")]
    InvalidDispatch {
        /// The entry point.
        kernel: &'static str,
        /// The rejected shape.
        dispatch: Dispatch,
    },

    /// A work-item panicked.
    #[error("A work-item of `{kernel}` failed\nCaused by:\n  {reason}")]
    KernelPanic {
        /// The entry point.
        kernel: &'static str,
        /// The panic message.
        reason: String,
    },

    /// The device couldn't provide the execution resources, e.g. lane threads.
    #[error("The device is out of execution resources\nCaused by:\n  {reason}")]
    OutOfResources {
        /// The underlying failure.
        reason: String,
    },

    /// The submission didn't complete in time.
    #[error("{launches} launch(es) didn't complete within {timeout:?}")]
    Timeout {
        /// Number of launches in the submission.
        launches: usize,
        /// The configured launch timeout.
        timeout: Duration,
    },

    /// The device stopped running the submission because it became unhealthy.
    #[error("The launch of `{kernel}` was cancelled, the device is unhealthy")]
    Cancelled {
        /// The entry point.
        kernel: &'static str,
    },

    /// The device queue stopped before reporting completion.
    #[error("The device queue was disconnected before the submission completed")]
    Disconnected,
}

impl Debug for LaunchError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_fmt(format_args!("{self}"))
    }
}

/// Resource limit errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResourceLimitError {
    /// Shared memory exceeds maximum.
    #[error(
        "Too much shared memory requested.\nRequested {requested} bytes, maximum {max} bytes available."
    )]
    SharedMemory {
        /// Value requested.
        requested: usize,
        /// Maximum value.
        max: usize,
    },

    /// Group size exceeds maximum.
    #[error("Group size exceeds maximum.\nRequested {requested} units, max units is {max}.")]
    GroupSize {
        /// Value requested.
        requested: u32,
        /// Maximum value.
        max: u32,
    },
}

/// Error that can happen while talking to a server.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServerError {
    /// A launch was rejected or failed.
    #[error("A launch error happened\nCaused by:\n  {0}")]
    Launch(#[from] LaunchError),

    /// The handle doesn't belong to this server.
    #[error("Unknown handle {0:?}")]
    UnknownHandle(HandleId),

    /// The buffer is still bound to outstanding work.
    #[error("Buffer {0:?} is still in use by an outstanding submission")]
    BufferInUse(HandleId),

    /// The server is an invalid state.
    #[error("The server is in an invalid state\nCaused by:\n  {reason}")]
    Unhealthy {
        /// Why the server stopped accepting work.
        reason: String,
    },
}

/// The compute server is responsible for handling resources and computations over resources.
///
/// Everything in the server is mutable, therefore it should be solely accessed through the
/// [`ComputeClient`](crate::client::ComputeClient) for thread safety.
pub trait ComputeServer: Send + Debug + 'static
where
    Self: Sized,
{
    /// Given a handle, returns the owned resource as bytes.
    fn read(&mut self, handle: &Handle) -> Result<Vec<u8>, ServerError>;

    /// Given a resource, stores it and returns the resource handle.
    fn create(&mut self, data: &[u8]) -> Handle;

    /// Reserves `size` bytes of zeroed device memory.
    fn empty(&mut self, size: usize) -> Handle;

    /// Make the entry points of `library` available to [ComputeServer::pipeline].
    fn load_library(&mut self, library: KernelLibrary);

    /// Build a compute pipeline from a named entry point.
    fn pipeline(&mut self, name: &str) -> Result<Pipeline, PipelineError>;

    /// Validate every launch of the command buffer and hand it to the device queue.
    fn submit(&mut self, commands: CommandBuffer) -> Result<Submission, ServerError>;

    /// Capabilities of the device.
    fn properties(&self) -> &HardwareProperties;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_last_group() {
        let dispatch = Dispatch::new(40, 32);

        assert_eq!(dispatch.group_count(), 2);
        assert_eq!(dispatch.lanes_in_group(0), 32);
        assert_eq!(dispatch.lanes_in_group(1), 8);
    }

    #[test]
    fn bindings_share_one_argument_index_space() {
        let handle = Handle::new(HandleId::new(), 16);
        let bindings = Bindings::new()
            .with_buffer(0, handle.binding())
            .with_scalar(1, 4)
            .with_shared_memory(0, 128);

        assert_eq!(bindings.arguments[&0].kind(), ArgumentKind::Buffer);
        assert_eq!(bindings.arguments[&1].kind(), ArgumentKind::Scalar);
        assert_eq!(bindings.shared_memory_size(), 128);
        assert!(handle.is_bound());
    }

    #[test]
    fn subgroups_require_a_plane_width() {
        let config = DeviceConfig {
            plane_dim: 0,
            ..Default::default()
        };

        assert!(!HardwareProperties::from(&config).subgroups);
    }
}
