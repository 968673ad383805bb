use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use parred_runtime::{
    command::{DeviceHealth, Launch},
    kernel::{Kernel, KernelArgument, Unit, UnitPosition},
    memory::Memory,
    server::{Dispatch, LaunchError},
    sync::{BarrierPoisoned, GroupBarrier, PlaneSync},
};

/// A launch whose bindings were resolved to device memory.
#[derive(new)]
pub struct ResolvedLaunch {
    kernel: Arc<dyn Kernel>,
    arguments: Vec<Option<KernelArgument>>,
    shared_sizes: Vec<usize>,
    dispatch: Dispatch,
    plane_dim: u32,
    // Keeps the bindings, and therefore the buffers, marked in use until the launch is done.
    _launch: Launch,
}

/// Runs launches on `max_concurrent_groups` slots of lane threads.
///
/// A slot owns one thread per lane of the widest group and walks its share of the groups,
/// so the number of threads of a launch doesn't grow with the grid.
#[derive(new, Debug)]
pub struct Scheduler {
    max_concurrent_groups: usize,
    lane_stack_bytes: usize,
}

impl Scheduler {
    /// Run a launch to completion.
    ///
    /// Slot `s` runs the groups `s`, `s + slots`, `s + 2 * slots`, ... one after the other;
    /// there is no ordering between the groups of different slots. The remaining groups are
    /// skipped once a lane fails or the device is marked unhealthy.
    pub fn dispatch(
        &self,
        launch: &ResolvedLaunch,
        health: &DeviceHealth,
    ) -> Result<(), LaunchError> {
        let kernel = launch.kernel.name();
        if health.is_failed() {
            return Err(LaunchError::Cancelled { kernel });
        }

        let group_count = launch.dispatch.group_count();
        let slot_count = (self.max_concurrent_groups.max(1) as u32).min(group_count);
        let lanes = launch.dispatch.lanes_in_group(0);
        log::debug!(
            "Dispatching {kernel} as {group_count} group(s) on {slot_count} slot(s) [{}]",
            launch.dispatch
        );

        let failure = LaunchFailure::default();
        let slots: Vec<GroupSlot> = (0..slot_count)
            .map(|first_group| GroupSlot::new(first_group, slot_count, lanes))
            .collect();

        thread::scope(|scope| {
            for slot in slots.iter() {
                for unit_pos in 0..lanes {
                    let lane = SlotLane {
                        launch,
                        slot,
                        unit_pos,
                        failure: &failure,
                        health,
                    };
                    let spawned = thread::Builder::new()
                        .stack_size(self.lane_stack_bytes)
                        .spawn_scoped(scope, move || lane.run());

                    if let Err(err) = spawned {
                        failure.record(LaunchError::OutOfResources {
                            reason: format!("Can't spawn lane {unit_pos}: {err}"),
                        });
                        // No lane of this slot can pass the gate without the missing ones.
                        slot.gate.poison();
                        break;
                    }
                }
            }
        });

        failure.into_result()
    }
}

/// A set of lane threads running groups one after the other.
struct GroupSlot {
    first_group: u32,
    stride: u32,
    gate: GroupBarrier,
    current: spin::Mutex<Option<Arc<GroupState>>>,
}

impl GroupSlot {
    fn new(first_group: u32, stride: u32, lanes: u32) -> Self {
        Self {
            first_group,
            stride,
            gate: GroupBarrier::new(lanes as usize),
            current: spin::Mutex::new(None),
        }
    }

    /// Wait for every lane of the slot, returns false once the slot was poisoned.
    fn pass_gate(&self) -> bool {
        panic::catch_unwind(AssertUnwindSafe(|| self.gate.wait())).is_ok()
    }
}

/// One lane thread of a slot.
struct SlotLane<'a> {
    launch: &'a ResolvedLaunch,
    slot: &'a GroupSlot,
    unit_pos: u32,
    failure: &'a LaunchFailure,
    health: &'a DeviceHealth,
}

impl SlotLane<'_> {
    fn run(self) {
        let group_count = self.launch.dispatch.group_count();
        let mut group_pos = self.slot.first_group;

        loop {
            if self.unit_pos == 0 {
                *self.slot.current.lock() = self.next_group(group_pos, group_count);
            }
            if !self.slot.pass_gate() {
                return;
            }

            let Some(group) = self.slot.current.lock().clone() else {
                return;
            };
            if self.unit_pos < group.lanes {
                run_lane(self.launch, &group, self.unit_pos, self.failure);
            }

            // Lane 0 replaces the group only once every lane is done with it.
            if !self.slot.pass_gate() {
                return;
            }
            group_pos += self.slot.stride;
        }
    }

    fn next_group(&self, group_pos: u32, group_count: u32) -> Option<Arc<GroupState>> {
        if group_pos >= group_count || self.failure.is_set() {
            return None;
        }
        if self.health.is_failed() {
            self.failure.record(LaunchError::Cancelled {
                kernel: self.launch.kernel.name(),
            });
            return None;
        }

        Some(Arc::new(GroupState::new(self.launch, group_pos)))
    }
}

/// Memory and synchronization shared by the lanes of one group.
struct GroupState {
    group_pos: u32,
    lanes: u32,
    barrier: GroupBarrier,
    planes: Vec<PlaneSync>,
    shared: Vec<Memory>,
}

impl GroupState {
    fn new(launch: &ResolvedLaunch, group_pos: u32) -> Self {
        let lanes = launch.dispatch.lanes_in_group(group_pos);
        let planes = match launch.kernel.signature().planes {
            true => {
                let plane_dim = launch.plane_dim.max(1);
                (0..lanes.div_ceil(plane_dim))
                    .map(|plane_pos| PlaneSync::new(plane_dim.min(lanes - plane_pos * plane_dim)))
                    .collect()
            }
            false => Vec::new(),
        };

        Self {
            group_pos,
            lanes,
            barrier: GroupBarrier::new(lanes as usize),
            planes,
            shared: launch
                .shared_sizes
                .iter()
                .map(|size| Memory::with_byte_size(*size))
                .collect(),
        }
    }

    fn poison(&self) {
        self.barrier.poison();
        for plane in self.planes.iter() {
            plane.poison();
        }
    }
}

fn run_lane(launch: &ResolvedLaunch, group: &GroupState, unit_pos: u32, failure: &LaunchFailure) {
    let position = UnitPosition::in_group(
        unit_pos,
        group.group_pos,
        launch.dispatch.group_size,
        group.lanes,
        launch.dispatch.grid_size,
        launch.plane_dim,
    );
    let plane = group.planes.get(position.plane_pos as usize);
    let unit = Unit::new(
        position,
        &launch.arguments,
        &group.shared,
        &group.barrier,
        plane,
    );

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| launch.kernel.execute(&unit)));

    if let Err(payload) = outcome {
        group.poison();
        if !payload.is::<BarrierPoisoned>() {
            failure.record(LaunchError::KernelPanic {
                kernel: launch.kernel.name(),
                reason: panic_message(payload.as_ref()),
            });
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// First failure reported by a lane of a launch.
#[derive(Default)]
struct LaunchFailure {
    error: spin::Mutex<Option<LaunchError>>,
}

impl LaunchFailure {
    fn is_set(&self) -> bool {
        self.error.lock().is_some()
    }

    fn record(&self, error: LaunchError) {
        let mut slot = self.error.lock();
        if slot.is_none() {
            *slot = Some(error);
        }
    }

    fn into_result(self) -> Result<(), LaunchError> {
        match self.error.into_inner() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}
