use crate::{client::ComputeClient, server::ComputeServer};

/// Runtime for a device: ties a device description to the server driving it.
pub trait Runtime: Send + Sync + 'static + core::fmt::Debug {
    /// The server type.
    type Server: ComputeServer;
    /// The device type.
    type Device: Default + Clone + core::fmt::Debug + Send + Sync;

    /// Create a client for a device.
    ///
    /// Every call creates a fresh server, so no allocation or state is shared between clients.
    fn client(device: &Self::Device) -> ComputeClient<Self::Server>;

    /// Name of the runtime.
    fn name() -> &'static str;
}
