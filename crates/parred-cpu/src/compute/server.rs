use core::time::Duration;
use std::sync::{Arc, mpsc};

use parred_runtime::{
    command::{CommandBuffer, DeviceHealth, Launch, Submission},
    config::device::DeviceConfig,
    kernel::{KernelArgument, KernelLibrary, Pipeline, PipelineError},
    logging::ServerLogger,
    memory::Memory,
    server::{
        Argument, ComputeServer, Handle, HardwareProperties, LaunchError, ServerError,
    },
};

use super::{
    BytesStorage,
    scheduler::{ResolvedLaunch, Scheduler},
    worker::{Job, Worker},
};

/// Server driving the simulated device.
#[derive(Debug)]
pub struct CpuServer {
    storage: BytesStorage,
    library: KernelLibrary,
    properties: HardwareProperties,
    worker: Worker,
    health: Arc<DeviceHealth>,
    launch_timeout: Duration,
    logger: ServerLogger,
}

impl CpuServer {
    /// Create a server for a device topology.
    pub fn new(config: &DeviceConfig, launch_timeout: Duration, logger: ServerLogger) -> Self {
        let scheduler = Scheduler::new(
            config.max_concurrent_groups as usize,
            config.lane_stack_bytes,
        );

        let health = Arc::new(DeviceHealth::default());

        Self {
            storage: BytesStorage::default(),
            library: KernelLibrary::new(),
            properties: HardwareProperties::from(config),
            worker: Worker::new(scheduler, health.clone()),
            health,
            launch_timeout,
            logger,
        }
    }

    fn resolve(&self, launch: Launch) -> Result<ResolvedLaunch, ServerError> {
        let slots = launch
            .bindings
            .arguments
            .keys()
            .next_back()
            .map(|index| *index as usize + 1)
            .unwrap_or(0);
        let mut arguments = vec![None; slots];

        for (index, argument) in launch.bindings.arguments.iter() {
            arguments[*index as usize] = Some(match argument {
                Argument::Buffer(binding) => {
                    KernelArgument::Buffer(self.storage.get(binding.id())?)
                }
                Argument::Scalar(value) => KernelArgument::Scalar(*value),
            });
        }

        let shared_count = launch
            .bindings
            .shared_memories
            .keys()
            .next_back()
            .map(|index| *index as usize + 1)
            .unwrap_or(0);
        let mut shared_sizes = vec![0; shared_count];
        for (index, size) in launch.bindings.shared_memories.iter() {
            shared_sizes[*index as usize] = *size;
        }

        Ok(ResolvedLaunch::new(
            launch.pipeline.kernel().clone(),
            arguments,
            shared_sizes,
            launch.dispatch,
            self.properties.plane_dim,
            launch,
        ))
    }
}

impl ComputeServer for CpuServer {
    fn read(&mut self, handle: &Handle) -> Result<Vec<u8>, ServerError> {
        if handle.is_bound() {
            return Err(ServerError::BufferInUse(handle.id()));
        }

        Ok(self.storage.get(handle.id())?.to_bytes())
    }

    fn create(&mut self, data: &[u8]) -> Handle {
        self.storage.alloc(Memory::from_bytes(data))
    }

    fn empty(&mut self, size: usize) -> Handle {
        self.storage.alloc(Memory::with_byte_size(size))
    }

    fn load_library(&mut self, library: KernelLibrary) {
        log::debug!("Loading kernel library {:?}", library.names());
        self.library.extend(library);
    }

    fn pipeline(&mut self, name: &str) -> Result<Pipeline, PipelineError> {
        let kernel = self
            .library
            .get(name)
            .ok_or_else(|| PipelineError::KernelNotFound {
                name: name.to_string(),
            })?;
        let signature = kernel.signature();

        let invalid = |reason: String| PipelineError::InvalidSignature {
            name: name.to_string(),
            reason,
        };

        if signature.arguments.len() > self.properties.max_bindings as usize {
            return Err(invalid(format!(
                "{} arguments declared, the device supports {}",
                signature.arguments.len(),
                self.properties.max_bindings
            )));
        }
        if signature.planes && !self.properties.subgroups {
            return Err(invalid(
                "plane primitives are not supported by the device".to_string(),
            ));
        }

        Ok(Pipeline::new(
            kernel,
            self.properties.max_group_size,
            self.properties.plane_dim,
        ))
    }

    fn submit(&mut self, commands: CommandBuffer) -> Result<Submission, ServerError> {
        if let Some(reason) = self.health.failure() {
            return Err(ServerError::Unhealthy { reason });
        }

        let count = commands.len();
        let mut launches = Vec::with_capacity(count);
        for launch in commands.into_launches() {
            launch.validate(&self.properties)?;
            if self.logger.launch_activated() {
                self.logger.log_launch(&launch);
            }
            launches.push(self.resolve(launch)?);
        }

        let (completion, receiver) = mpsc::channel();
        let submission =
            Submission::new(receiver, count, self.launch_timeout, self.health.clone());

        if launches.is_empty() {
            let _ = completion.send(Ok(()));
            return Ok(submission);
        }

        self.worker
            .send_job(Job {
                launches,
                completion,
            })
            .map_err(|_| LaunchError::Disconnected)?;

        Ok(submission)
    }

    fn properties(&self) -> &HardwareProperties {
        &self.properties
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CpuRuntime, RuntimeOptions};
    use parred_runtime::{
        client::ComputeClient,
        kernel::{ArgumentKind, Kernel, KernelSignature, Unit},
        server::{Bindings, Dispatch, ResourceLimitError},
    };
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn options() -> RuntimeOptions {
        RuntimeOptions {
            device: DeviceConfig {
                max_group_size: 64,
                plane_dim: 8,
                max_concurrent_groups: 2,
                ..DeviceConfig::default()
            },
            launch_timeout: Duration::from_secs(10),
        }
    }

    fn client_with(library: KernelLibrary) -> ComputeClient<CpuServer> {
        let client = CpuRuntime::client_with_options(options());
        client.load_library(library);
        client
    }

    /// out[i] = in[i] + scalar
    #[derive(Debug)]
    struct AddScalar;

    impl Kernel for AddScalar {
        fn name(&self) -> &'static str {
            "add_scalar"
        }

        fn signature(&self) -> KernelSignature {
            KernelSignature {
                arguments: &[ArgumentKind::Buffer, ArgumentKind::Scalar],
                shared_memories: 0,
                planes: false,
            }
        }

        fn execute(&self, unit: &Unit<'_>) {
            let buffer = unit.buffer(0);
            let index = unit.absolute_pos();
            buffer.store(index, buffer.load(index) + unit.scalar(1) as f32);
        }
    }

    /// Every lane publishes its position in shared memory and reads its right neighbour's
    /// after a barrier.
    #[derive(Debug)]
    struct RotateInGroup;

    impl Kernel for RotateInGroup {
        fn name(&self) -> &'static str {
            "rotate_in_group"
        }

        fn signature(&self) -> KernelSignature {
            KernelSignature {
                arguments: &[ArgumentKind::Buffer],
                shared_memories: 1,
                planes: false,
            }
        }

        fn execute(&self, unit: &Unit<'_>) {
            let shared = unit.shared(0);
            shared.store(unit.unit_pos(), unit.absolute_pos() as f32);
            unit.sync_units();

            let neighbour = (unit.unit_pos() + 1) % unit.group_size();
            unit.buffer(0)
                .store(unit.absolute_pos(), shared.load(neighbour));
        }
    }

    /// Writes the sum of its plane for every lane.
    #[derive(Debug)]
    struct PlaneSum;

    impl Kernel for PlaneSum {
        fn name(&self) -> &'static str {
            "plane_sum"
        }

        fn signature(&self) -> KernelSignature {
            KernelSignature {
                arguments: &[ArgumentKind::Buffer],
                shared_memories: 0,
                planes: true,
            }
        }

        fn execute(&self, unit: &Unit<'_>) {
            let sum = unit.plane_sum(1.0);
            unit.buffer(0).store(unit.absolute_pos(), sum);
        }
    }

    #[derive(Debug)]
    struct PanicAfterBarrier;

    impl Kernel for PanicAfterBarrier {
        fn name(&self) -> &'static str {
            "panic_after_barrier"
        }

        fn signature(&self) -> KernelSignature {
            KernelSignature {
                arguments: &[],
                shared_memories: 0,
                planes: false,
            }
        }

        fn execute(&self, unit: &Unit<'_>) {
            if unit.unit_pos() == 3 {
                panic!("lane 3 gave up");
            }
            unit.sync_units();
        }
    }

    #[derive(Debug)]
    struct Sleep;

    impl Kernel for Sleep {
        fn name(&self) -> &'static str {
            "sleep"
        }

        fn signature(&self) -> KernelSignature {
            KernelSignature {
                arguments: &[],
                shared_memories: 0,
                planes: false,
            }
        }

        fn execute(&self, _unit: &Unit<'_>) {
            std::thread::sleep(Duration::from_millis(300));
        }
    }

    /// Writes the grid size, the plane width and the plane index of every lane.
    #[derive(Debug)]
    struct Positions;

    impl Kernel for Positions {
        fn name(&self) -> &'static str {
            "positions"
        }

        fn signature(&self) -> KernelSignature {
            KernelSignature {
                arguments: &[ArgumentKind::Buffer],
                shared_memories: 0,
                planes: false,
            }
        }

        fn execute(&self, unit: &Unit<'_>) {
            let output = unit.buffer(0);
            let index = unit.absolute_pos() * 3;
            output.store(index, unit.grid_size() as f32);
            output.store(index + 1, unit.plane_dim() as f32);
            output.store(index + 2, unit.plane_pos() as f32);
        }
    }

    /// Counts the groups it ran, each one taking a few milliseconds.
    #[derive(Debug)]
    struct CountingSleep {
        executed: Arc<AtomicU32>,
    }

    impl Kernel for CountingSleep {
        fn name(&self) -> &'static str {
            "counting_sleep"
        }

        fn signature(&self) -> KernelSignature {
            KernelSignature {
                arguments: &[],
                shared_memories: 0,
                planes: false,
            }
        }

        fn execute(&self, _unit: &Unit<'_>) {
            std::thread::sleep(Duration::from_millis(10));
            self.executed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test_log::test]
    fn created_resource_is_the_same_when_read() {
        let client = client_with(KernelLibrary::new());
        let resource = [0.5f32, 1.0, 2.0];
        let handle = client.create_from_slice(&resource);

        assert_eq!(client.read_as::<f32>(&handle).unwrap(), resource.to_vec());
    }

    #[test_log::test]
    fn empty_allocates_zeroed_memory() {
        let client = client_with(KernelLibrary::new());
        let handle = client.empty(8);

        assert_eq!(client.read_one(&handle).unwrap(), vec![0u8; 8]);
    }

    #[test_log::test]
    fn missing_entry_point_is_reported() {
        let client = client_with(KernelLibrary::new().with_kernel(AddScalar));

        assert_eq!(
            client.pipeline("kernel_decomposition").unwrap_err(),
            PipelineError::KernelNotFound {
                name: "kernel_decomposition".to_string()
            }
        );
    }

    #[test_log::test]
    fn plane_kernel_is_rejected_without_subgroups() {
        let mut options = options();
        options.device.subgroups = false;
        let client = CpuRuntime::client_with_options(options);
        client.load_library(KernelLibrary::new().with_kernel(PlaneSum));

        assert!(matches!(
            client.pipeline("plane_sum"),
            Err(PipelineError::InvalidSignature { .. })
        ));
    }

    #[test_log::test]
    fn launches_run_in_submission_order() {
        let client = client_with(KernelLibrary::new().with_kernel(AddScalar));
        let pipeline = client.pipeline("add_scalar").unwrap();
        let handle = client.create_from_slice(&[0.0f32; 100]);

        let mut commands = CommandBuffer::new();
        for value in 1..=3 {
            commands.encode(
                &pipeline,
                Bindings::new()
                    .with_buffer(0, handle.binding())
                    .with_scalar(1, value),
                Dispatch::new(100, 64),
            );
        }
        assert_eq!(commands.launches().len(), 3);

        let submission = client.submit(commands).unwrap();
        assert_eq!(submission.launches(), 3);
        submission.wait_until_completed().unwrap();

        assert_eq!(client.read_as::<f32>(&handle).unwrap(), vec![6.0; 100]);
    }

    #[test_log::test]
    fn barrier_makes_shared_writes_visible_to_the_group() {
        let client = client_with(KernelLibrary::new().with_kernel(RotateInGroup));
        let pipeline = client.pipeline("rotate_in_group").unwrap();
        let handle = client.empty(4 * 96);

        let mut commands = CommandBuffer::new();
        commands.encode(
            &pipeline,
            Bindings::new()
                .with_buffer(0, handle.binding())
                .with_shared_memory(0, 4 * 64),
            Dispatch::new(96, 64),
        );
        client.execute(commands).unwrap();

        let expected: Vec<f32> = (0..96u32)
            .map(|pos| {
                let (group, lanes) = if pos < 64 { (0, 64) } else { (64, 32) };
                (group + (pos - group + 1) % lanes) as f32
            })
            .collect();
        assert_eq!(client.read_as::<f32>(&handle).unwrap(), expected);
    }

    #[test_log::test]
    fn plane_sum_only_counts_existing_lanes() {
        let client = client_with(KernelLibrary::new().with_kernel(PlaneSum));
        let pipeline = client.pipeline("plane_sum").unwrap();
        let handle = client.empty(4 * 20);

        let mut commands = CommandBuffer::new();
        commands.encode(
            &pipeline,
            Bindings::new().with_buffer(0, handle.binding()),
            Dispatch::new(20, 16),
        );
        client.execute(commands).unwrap();

        // Group 0 holds two full planes of 8, group 1 a single plane of 4 lanes.
        let mut expected = vec![8.0; 16];
        expected.extend([4.0; 4]);
        assert_eq!(client.read_as::<f32>(&handle).unwrap(), expected);
    }

    #[test_log::test]
    fn units_see_the_grid_and_their_plane() {
        let client = client_with(KernelLibrary::new().with_kernel(Positions));
        let pipeline = client.pipeline("positions").unwrap();
        let handle = client.empty(4 * 3 * 20);

        let mut commands = CommandBuffer::new();
        commands.encode(
            &pipeline,
            Bindings::new().with_buffer(0, handle.binding()),
            Dispatch::new(20, 16),
        );
        client.execute(commands).unwrap();

        // Lanes 8..16 of group 0 form the second plane, the partial group 1 a single one.
        let expected: Vec<f32> = (0..20u32)
            .flat_map(|pos| {
                let plane_pos = if (8..16).contains(&pos) { 1.0 } else { 0.0 };
                [20.0, 8.0, plane_pos]
            })
            .collect();
        assert_eq!(client.read_as::<f32>(&handle).unwrap(), expected);
    }

    #[test_log::test]
    fn oversized_group_is_rejected_before_running() {
        let client = client_with(KernelLibrary::new().with_kernel(AddScalar));
        let pipeline = client.pipeline("add_scalar").unwrap();
        let handle = client.empty(4 * 128);

        let mut commands = CommandBuffer::new();
        commands.encode(
            &pipeline,
            Bindings::new()
                .with_buffer(0, handle.binding())
                .with_scalar(1, 1),
            Dispatch::new(128, 128),
        );

        assert_eq!(
            client.submit(commands).unwrap_err(),
            ServerError::Launch(LaunchError::TooManyResources(
                ResourceLimitError::GroupSize {
                    requested: 128,
                    max: 64
                }
            ))
        );
    }

    #[test_log::test]
    fn panicking_lane_fails_the_launch_without_hanging_the_group() {
        let client = client_with(KernelLibrary::new().with_kernel(PanicAfterBarrier));
        let pipeline = client.pipeline("panic_after_barrier").unwrap();

        let mut commands = CommandBuffer::new();
        commands.encode(&pipeline, Bindings::new(), Dispatch::new(16, 16));
        let result = client.execute(commands);

        assert!(matches!(
            result,
            Err(ServerError::Launch(LaunchError::KernelPanic {
                kernel: "panic_after_barrier",
                ..
            }))
        ));
    }

    #[test_log::test]
    fn buffer_cannot_be_read_while_bound_to_outstanding_work() {
        let client = client_with(KernelLibrary::new().with_kernel(AddScalar));
        let pipeline = client.pipeline("add_scalar").unwrap();
        let handle = client.create_from_slice(&[1.0f32; 4]);

        let mut commands = CommandBuffer::new();
        commands.encode(
            &pipeline,
            Bindings::new()
                .with_buffer(0, handle.binding())
                .with_scalar(1, 1),
            Dispatch::new(4, 4),
        );
        // Still encoded, not submitted.
        assert_eq!(
            client.read_one(&handle).unwrap_err(),
            ServerError::BufferInUse(handle.id())
        );

        client.execute(commands).unwrap();
        assert_eq!(client.read_as::<f32>(&handle).unwrap(), vec![2.0; 4]);
    }

    #[test_log::test]
    fn timed_out_device_rejects_later_submissions() {
        let mut options = options();
        options.launch_timeout = Duration::from_millis(20);
        let client = CpuRuntime::client_with_options(options);
        client.load_library(KernelLibrary::new().with_kernel(Sleep));
        let pipeline = client.pipeline("sleep").unwrap();

        let mut commands = CommandBuffer::new();
        commands.encode(&pipeline, Bindings::new(), Dispatch::new(1, 1));
        let result = client.execute(commands);
        assert!(matches!(
            result,
            Err(ServerError::Launch(LaunchError::Timeout { launches: 1, .. }))
        ));

        let mut commands = CommandBuffer::new();
        commands.encode(&pipeline, Bindings::new(), Dispatch::new(1, 1));
        assert!(matches!(
            client.submit(commands),
            Err(ServerError::Unhealthy { .. })
        ));
    }

    #[test_log::test]
    fn timed_out_submission_stops_running_its_groups() {
        let mut options = options();
        options.launch_timeout = Duration::from_millis(20);
        let client = CpuRuntime::client_with_options(options);
        let executed = Arc::new(AtomicU32::new(0));
        client.load_library(KernelLibrary::new().with_kernel(CountingSleep {
            executed: executed.clone(),
        }));
        let pipeline = client.pipeline("counting_sleep").unwrap();

        // 64 groups of one lane on two slots would take about 320ms.
        let mut commands = CommandBuffer::new();
        commands.encode(&pipeline, Bindings::new(), Dispatch::new(64, 1));
        let result = client.execute(commands);
        assert!(matches!(
            result,
            Err(ServerError::Launch(LaunchError::Timeout { launches: 1, .. }))
        ));

        std::thread::sleep(Duration::from_millis(100));
        let after_timeout = executed.load(Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(100));

        assert_eq!(executed.load(Ordering::SeqCst), after_timeout);
        assert!(after_timeout < 64, "{after_timeout} groups ran");
    }
}
