use std::sync::Arc;

use spin::Mutex;

use crate::{
    command::{CommandBuffer, Submission},
    kernel::{KernelLibrary, Pipeline, PipelineError},
    server::{ComputeServer, Handle, HardwareProperties, ServerError},
};

/// The ComputeClient is the entry point to require tasks from the ComputeServer.
/// It should be obtained for a specific device via [Runtime::client](crate::Runtime::client).
///
/// Every call locks the server for its duration only; waiting on a [Submission] happens
/// without holding the lock.
#[derive(Debug)]
pub struct ComputeClient<Server> {
    server: Arc<Mutex<Server>>,
    properties: Arc<HardwareProperties>,
}

impl<S> Clone for ComputeClient<S> {
    fn clone(&self) -> Self {
        Self {
            server: self.server.clone(),
            properties: self.properties.clone(),
        }
    }
}

impl<Server> ComputeClient<Server>
where
    Server: ComputeServer,
{
    /// Create a new client.
    pub fn new(server: Server) -> Self {
        let properties = Arc::new(server.properties().clone());
        Self {
            server: Arc::new(Mutex::new(server)),
            properties,
        }
    }

    /// Given a handle, returns the owned resource as bytes.
    pub fn read_one(&self, handle: &Handle) -> Result<Vec<u8>, ServerError> {
        self.server.lock().read(handle)
    }

    /// Read a handle and reinterpret its bytes as `T`.
    pub fn read_as<T: bytemuck::Pod>(&self, handle: &Handle) -> Result<Vec<T>, ServerError> {
        let bytes = self.read_one(handle)?;
        Ok(bytemuck::pod_collect_to_vec(&bytes))
    }

    /// Given a resource, stores it and returns the resource handle.
    pub fn create(&self, data: &[u8]) -> Handle {
        self.server.lock().create(data)
    }

    /// Store a slice of plain values and return the resource handle.
    pub fn create_from_slice<T: bytemuck::Pod>(&self, slice: &[T]) -> Handle {
        self.create(bytemuck::cast_slice(slice))
    }

    /// Reserves `size` bytes of zeroed device memory.
    pub fn empty(&self, size: usize) -> Handle {
        self.server.lock().empty(size)
    }

    /// Make the entry points of `library` available to [ComputeClient::pipeline].
    pub fn load_library(&self, library: KernelLibrary) {
        self.server.lock().load_library(library)
    }

    /// Build a compute pipeline from a named entry point.
    pub fn pipeline(&self, name: &str) -> Result<Pipeline, PipelineError> {
        self.server.lock().pipeline(name)
    }

    /// Hand a command buffer to the device.
    pub fn submit(&self, commands: CommandBuffer) -> Result<Submission, ServerError> {
        self.server.lock().submit(commands)
    }

    /// Submit a command buffer and wait until it completed.
    pub fn execute(&self, commands: CommandBuffer) -> Result<(), ServerError> {
        let submission = self.submit(commands)?;
        submission.wait_until_completed()?;
        Ok(())
    }

    /// Capabilities of the device.
    pub fn properties(&self) -> &HardwareProperties {
        &self.properties
    }
}
