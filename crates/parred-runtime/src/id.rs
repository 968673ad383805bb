use std::sync::Arc;

#[macro_export(local_inner_macros)]
/// Create a new storage ID type.
macro_rules! storage_id_type {
    ($name:ident) => {
        /// Storage ID.
        #[derive(Copy, Clone, Hash, PartialEq, Eq, Debug, PartialOrd, Ord)]
        pub struct $name {
            value: usize,
        }

        impl $name {
            /// Create a new ID.
            pub fn new() -> Self {
                use core::sync::atomic::{AtomicUsize, Ordering};

                static COUNTER: AtomicUsize = AtomicUsize::new(0);

                let value = COUNTER.fetch_add(1, Ordering::Relaxed);
                if value == usize::MAX {
                    core::panic!("Memory ID overflowed");
                }
                Self { value }
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }
    };
}

/// Reference counting of a device allocation.
///
/// Cloning the handle only bumps `all`; launches hold the inner `bound` counter so the
/// server can tell whether a buffer is still in use by outstanding work.
#[derive(Clone, Debug)]
pub(crate) struct HandleRef<Id> {
    id: Id,
    all: Arc<Arc<()>>,
}

/// Reference held by a launch for as long as it is outstanding.
#[derive(Clone, Debug)]
pub(crate) struct BindingRef<Id> {
    id: Id,
    _bound: Arc<()>,
}

impl<Id> BindingRef<Id> {
    pub(crate) fn id(&self) -> &Id {
        &self.id
    }
}

impl<Id: Clone> HandleRef<Id> {
    pub(crate) fn new(id: Id) -> Self {
        Self {
            id,
            all: Arc::new(Arc::new(())),
        }
    }

    pub(crate) fn id(&self) -> &Id {
        &self.id
    }

    pub(crate) fn binding(&self) -> BindingRef<Id> {
        BindingRef {
            id: self.id.clone(),
            _bound: self.all.as_ref().clone(),
        }
    }

    /// If an outstanding launch still references the allocation.
    pub(crate) fn is_bound(&self) -> bool {
        Arc::strong_count(self.all.as_ref()) > 1
    }

    /// If only the storage still references the allocation.
    pub(crate) fn is_free(&self) -> bool {
        Arc::strong_count(&self.all) <= 1 && !self.is_bound()
    }
}
