use core::time::Duration;

use parred_runtime::{
    Runtime,
    client::ComputeClient,
    config::{GlobalConfig, device::DeviceConfig},
    logging::ServerLogger,
};

use crate::{compute::server::CpuServer, device::CpuDevice};

/// Options used to create a [CpuServer].
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    /// Topology of the simulated device.
    pub device: DeviceConfig,
    /// How long a submission may run before the host gives up.
    pub launch_timeout: Duration,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        let config = GlobalConfig::get();
        Self {
            device: config.device.clone(),
            launch_timeout: config.launch.timeout(),
        }
    }
}

#[derive(Debug)]
pub struct CpuRuntime;

impl CpuRuntime {
    /// Create a client with explicit options instead of the global configuration.
    pub fn client_with_options(options: RuntimeOptions) -> ComputeClient<CpuServer> {
        create_client(options)
    }
}

fn create_client(options: RuntimeOptions) -> ComputeClient<CpuServer> {
    log::debug!(
        "Creating a cpu device with groups of up to {} units and planes of {}",
        options.device.max_group_size,
        options.device.plane_dim
    );
    let server = CpuServer::new(&options.device, options.launch_timeout, ServerLogger::default());
    ComputeClient::new(server)
}

impl Runtime for CpuRuntime {
    type Server = CpuServer;
    type Device = CpuDevice;

    fn client(_device: &Self::Device) -> ComputeClient<Self::Server> {
        create_client(RuntimeOptions::default())
    }

    fn name() -> &'static str {
        "cpu"
    }
}
