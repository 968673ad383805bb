/// Hardware topology exposed by a host-side device.
///
/// A real GPU reports these numbers; the simulated devices read them from the
/// `[device]` section so the same host code can be exercised against different shapes.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Maximum number of work-items in a group.
    #[serde(default = "max_group_size_default")]
    pub max_group_size: u32,

    /// Number of lanes executing in lock-step.
    #[serde(default = "plane_dim_default")]
    pub plane_dim: u32,

    /// Whether subgroup primitives are available at all.
    #[serde(default = "subgroups_default")]
    pub subgroups: bool,

    /// Maximum group-shared memory per group, in bytes.
    #[serde(default = "max_shared_memory_bytes_default")]
    pub max_shared_memory_bytes: usize,

    /// Maximum number of argument slots a kernel can declare.
    #[serde(default = "max_bindings_default")]
    pub max_bindings: u32,

    /// Number of groups executed at the same time.
    #[serde(default = "max_concurrent_groups_default")]
    pub max_concurrent_groups: u32,

    /// Stack size of a single simulated lane.
    #[serde(default = "lane_stack_bytes_default")]
    pub lane_stack_bytes: usize,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            max_group_size: max_group_size_default(),
            plane_dim: plane_dim_default(),
            subgroups: subgroups_default(),
            max_shared_memory_bytes: max_shared_memory_bytes_default(),
            max_bindings: max_bindings_default(),
            max_concurrent_groups: max_concurrent_groups_default(),
            lane_stack_bytes: lane_stack_bytes_default(),
        }
    }
}

fn max_group_size_default() -> u32 {
    256
}

fn plane_dim_default() -> u32 {
    32
}

fn subgroups_default() -> bool {
    true
}

fn max_shared_memory_bytes_default() -> usize {
    32 * 1024
}

fn max_bindings_default() -> u32 {
    31
}

fn max_concurrent_groups_default() -> u32 {
    std::thread::available_parallelism()
        .map(|count| count.get().min(2) as u32)
        .unwrap_or(1)
}

fn lane_stack_bytes_default() -> usize {
    64 * 1024
}
