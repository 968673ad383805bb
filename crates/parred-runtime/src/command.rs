use core::fmt::Display;
use core::time::Duration;
use std::sync::{
    Arc,
    mpsc::{Receiver, RecvTimeoutError},
};

use crate::{
    kernel::{ArgumentKind, Pipeline},
    server::{Argument, Bindings, Dispatch, HardwareProperties, LaunchError, ResourceLimitError},
};

/// A kernel launch: a pipeline, its arguments and the launch shape.
#[derive(new, Debug, Clone)]
pub struct Launch {
    /// The compiled entry point.
    pub pipeline: Pipeline,
    /// The arguments.
    pub bindings: Bindings,
    /// The launch shape.
    pub dispatch: Dispatch,
}

impl Launch {
    /// Check the launch against the kernel signature and the device limits.
    pub fn validate(&self, properties: &HardwareProperties) -> Result<(), LaunchError> {
        let kernel = self.pipeline.name();
        let signature = self.pipeline.signature();

        if self.dispatch.grid_size == 0 || self.dispatch.group_size == 0 {
            return Err(LaunchError::InvalidDispatch {
                kernel,
                dispatch: self.dispatch,
            });
        }

        let max_group_size = self.pipeline.max_group_size();
        if self.dispatch.group_size > max_group_size {
            return Err(ResourceLimitError::GroupSize {
                requested: self.dispatch.group_size,
                max: max_group_size,
            }
            .into());
        }

        let shared_memory_size = self.bindings.shared_memory_size();
        if shared_memory_size > properties.max_shared_memory_bytes {
            return Err(ResourceLimitError::SharedMemory {
                requested: shared_memory_size,
                max: properties.max_shared_memory_bytes,
            }
            .into());
        }

        for (index, expected) in signature.arguments.iter().enumerate() {
            let index = index as u32;
            let bound = self.bindings.arguments.get(&index).map(Argument::kind);
            if bound != Some(*expected) {
                return Err(LaunchError::MissingBinding {
                    kernel,
                    index,
                    expected: *expected,
                });
            }
        }

        for index in 0..signature.shared_memories {
            if !self.bindings.shared_memories.contains_key(&index) {
                return Err(LaunchError::MissingSharedMemory { kernel, index });
            }
        }

        Ok(())
    }

    /// Number of buffer arguments.
    pub fn buffer_count(&self) -> usize {
        self.bindings
            .arguments
            .values()
            .filter(|argument| argument.kind() == ArgumentKind::Buffer)
            .count()
    }
}

impl Display for Launch {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} [{}]", self.pipeline.name(), self.dispatch)
    }
}

/// An ordered list of launches submitted together.
///
/// The device runs the launches one after the other: a launch only starts once every
/// work-item of the previous one completed, so a launch observes every write of the launches
/// encoded before it.
#[derive(Debug, Default)]
pub struct CommandBuffer {
    launches: Vec<Launch>,
}

impl CommandBuffer {
    /// Create an empty command buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a launch.
    pub fn encode(&mut self, pipeline: &Pipeline, bindings: Bindings, dispatch: Dispatch) {
        self.launches
            .push(Launch::new(pipeline.clone(), bindings, dispatch));
    }

    /// Number of encoded launches.
    pub fn len(&self) -> usize {
        self.launches.len()
    }

    /// If nothing was encoded.
    pub fn is_empty(&self) -> bool {
        self.launches.is_empty()
    }

    /// The encoded launches.
    pub fn launches(&self) -> &[Launch] {
        &self.launches
    }

    /// Take the encoded launches.
    pub fn into_launches(self) -> Vec<Launch> {
        self.launches
    }
}

/// Health flag of a device, flipped when a submission times out.
///
/// A timed-out submission may still hold lanes on the device, so nothing can be submitted
/// after it.
#[derive(Debug, Default)]
pub struct DeviceHealth {
    failure: spin::Mutex<Option<String>>,
}

impl DeviceHealth {
    /// Record why the device can't be used anymore. The first reason wins.
    pub fn fail(&self, reason: String) {
        let mut failure = self.failure.lock();
        if failure.is_none() {
            *failure = Some(reason);
        }
    }

    /// The recorded failure, if any.
    pub fn failure(&self) -> Option<String> {
        self.failure.lock().clone()
    }

    /// If a failure was recorded.
    pub fn is_failed(&self) -> bool {
        self.failure.lock().is_some()
    }
}

/// A command buffer handed to the device.
#[derive(Debug)]
pub struct Submission {
    completion: Receiver<Result<(), LaunchError>>,
    launches: usize,
    timeout: Duration,
    health: Arc<DeviceHealth>,
}

impl Submission {
    /// Create a submission. Only servers should call this.
    pub fn new(
        completion: Receiver<Result<(), LaunchError>>,
        launches: usize,
        timeout: Duration,
        health: Arc<DeviceHealth>,
    ) -> Self {
        Self {
            completion,
            launches,
            timeout,
            health,
        }
    }

    /// Number of launches in the submission.
    pub fn launches(&self) -> usize {
        self.launches
    }

    /// Block until every launch completed, or until the launch timeout elapsed.
    ///
    /// A timeout marks the device unhealthy.
    pub fn wait_until_completed(self) -> Result<(), LaunchError> {
        match self.completion.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                let err = LaunchError::Timeout {
                    launches: self.launches,
                    timeout: self.timeout,
                };
                self.health.fail(err.to_string());
                Err(err)
            }
            Err(RecvTimeoutError::Disconnected) => Err(LaunchError::Disconnected),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        kernel::{Kernel, KernelSignature, Unit},
        server::{Handle, HandleId},
    };
    use std::sync::mpsc;

    #[derive(Debug)]
    struct Scale;

    impl Kernel for Scale {
        fn name(&self) -> &'static str {
            "scale"
        }

        fn signature(&self) -> KernelSignature {
            KernelSignature {
                arguments: &[ArgumentKind::Buffer, ArgumentKind::Scalar],
                shared_memories: 1,
                planes: false,
            }
        }

        fn execute(&self, _unit: &Unit<'_>) {}
    }

    fn properties() -> HardwareProperties {
        HardwareProperties {
            max_group_size: 64,
            plane_dim: 32,
            subgroups: true,
            max_shared_memory_bytes: 1024,
            max_bindings: 8,
        }
    }

    fn launch(bindings: Bindings, dispatch: Dispatch) -> Launch {
        Launch::new(Pipeline::new(Arc::new(Scale), 64, 32), bindings, dispatch)
    }

    #[test]
    fn complete_launch_is_valid() {
        let handle = Handle::new(HandleId::new(), 16);
        let bindings = Bindings::new()
            .with_buffer(0, handle.binding())
            .with_scalar(1, 2)
            .with_shared_memory(0, 256);

        assert_eq!(
            launch(bindings, Dispatch::new(128, 64)).validate(&properties()),
            Ok(())
        );
    }

    #[test]
    fn wrong_argument_kind_is_rejected() {
        let bindings = Bindings::new()
            .with_scalar(0, 1)
            .with_scalar(1, 2)
            .with_shared_memory(0, 256);

        assert_eq!(
            launch(bindings, Dispatch::new(4, 4)).validate(&properties()),
            Err(LaunchError::MissingBinding {
                kernel: "scale",
                index: 0,
                expected: ArgumentKind::Buffer,
            })
        );
    }

    #[test]
    fn oversized_group_is_rejected() {
        let result = launch(Bindings::new(), Dispatch::new(256, 128)).validate(&properties());

        assert_eq!(
            result,
            Err(LaunchError::TooManyResources(ResourceLimitError::GroupSize {
                requested: 128,
                max: 64,
            }))
        );
    }

    #[test]
    fn empty_grid_is_rejected() {
        let result = launch(Bindings::new(), Dispatch::new(0, 1)).validate(&properties());

        assert!(matches!(result, Err(LaunchError::InvalidDispatch { .. })));
    }

    #[test_log::test]
    fn timeout_marks_the_device_unhealthy() {
        let (_sender, receiver) = mpsc::channel();
        let health = Arc::new(DeviceHealth::default());
        let submission = Submission::new(receiver, 3, Duration::from_millis(5), health.clone());

        let result = submission.wait_until_completed();

        assert!(matches!(result, Err(LaunchError::Timeout { launches: 3, .. })));
        assert!(health.is_failed());
        assert!(health.failure().is_some());
    }
}
