use std::sync::Arc;

use hashbrown::HashMap;
use parred_runtime::{
    memory::Memory,
    server::{Handle, HandleId, ServerError},
};

/// Device allocations of the cpu server, kept alive while any handle or binding refers to
/// them.
#[derive(Debug, Default)]
pub struct BytesStorage {
    memory: HashMap<HandleId, StorageEntry>,
}

#[derive(Debug)]
struct StorageEntry {
    handle: Handle,
    memory: Arc<Memory>,
}

impl BytesStorage {
    /// Store an allocation and return its handle.
    pub fn alloc(&mut self, memory: Memory) -> Handle {
        self.cleanup();

        let handle = Handle::new(HandleId::new(), memory.size());
        self.memory.insert(
            handle.id(),
            StorageEntry {
                handle: handle.clone(),
                memory: Arc::new(memory),
            },
        );
        handle
    }

    /// The allocation behind an id.
    pub fn get(&self, id: HandleId) -> Result<Arc<Memory>, ServerError> {
        self.memory
            .get(&id)
            .map(|entry| entry.memory.clone())
            .ok_or(ServerError::UnknownHandle(id))
    }

    /// Number of live allocations.
    pub fn len(&self) -> usize {
        self.memory.len()
    }

    /// If no allocation is alive.
    pub fn is_empty(&self) -> bool {
        self.memory.is_empty()
    }

    /// Drop every allocation nobody refers to anymore.
    pub fn cleanup(&mut self) {
        self.memory.retain(|_, entry| !entry.handle.is_free());
    }
}
