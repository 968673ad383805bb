/// The host CPU, used as a simulated parallel device.
#[derive(Clone, Debug, Hash, PartialEq, Eq, Default)]
pub struct CpuDevice;
