use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use crate::memory::Memory;

/// Unwinding payload used to release lanes blocked on a poisoned barrier.
///
/// It is raised with [std::panic::resume_unwind], which skips the panic hook, so only the
/// lane that actually failed reports anything.
#[derive(Debug, Clone, Copy)]
pub struct BarrierPoisoned;

/// A reusable barrier for the lanes of one group.
///
/// Unlike [std::sync::Barrier] it can be poisoned: when a lane fails, the remaining lanes
/// unwind out of [GroupBarrier::wait] instead of waiting forever for a lane that will never
/// arrive.
#[derive(Debug)]
pub struct GroupBarrier {
    lanes: usize,
    state: Mutex<BarrierState>,
    condvar: Condvar,
}

#[derive(Debug, Default)]
struct BarrierState {
    arrived: usize,
    generation: u64,
    poisoned: bool,
}

impl GroupBarrier {
    /// Create a barrier released once `lanes` lanes are waiting.
    pub fn new(lanes: usize) -> Self {
        Self {
            lanes,
            state: Mutex::new(BarrierState::default()),
            condvar: Condvar::new(),
        }
    }

    /// Number of lanes synchronized by the barrier.
    pub fn lanes(&self) -> usize {
        self.lanes
    }

    /// Block until every lane reached the barrier.
    ///
    /// # Panics
    ///
    /// Unwinds with [BarrierPoisoned] when the barrier is poisoned before being released.
    pub fn wait(&self) {
        let mut state = self.lock();
        if state.poisoned {
            drop(state);
            unwind_poisoned();
        }

        let generation = state.generation;
        state.arrived += 1;

        if state.arrived == self.lanes {
            state.arrived = 0;
            state.generation += 1;
            self.condvar.notify_all();
            return;
        }

        while state.generation == generation && !state.poisoned {
            state = self
                .condvar
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }

        if state.generation == generation {
            drop(state);
            unwind_poisoned();
        }
    }

    /// Release every waiting lane with [BarrierPoisoned], now and for every later wait.
    pub fn poison(&self) {
        self.lock().poisoned = true;
        self.condvar.notify_all();
    }

    fn lock(&self) -> MutexGuard<'_, BarrierState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn unwind_poisoned() -> ! {
    std::panic::resume_unwind(Box::new(BarrierPoisoned))
}

/// Lock-step state of one plane (subgroup).
///
/// Lanes publish their value, meet at the plane barrier, fold every published value in lane
/// order and meet again before the slots can be reused. The fold order doesn't depend on
/// scheduling, so every lane of the plane observes the same bit-exact result.
#[derive(Debug)]
pub struct PlaneSync {
    barrier: GroupBarrier,
    slots: Memory,
}

impl PlaneSync {
    /// Create the state of a plane made of `lanes` lanes.
    pub fn new(lanes: u32) -> Self {
        Self {
            barrier: GroupBarrier::new(lanes as usize),
            slots: Memory::zeroed(lanes as usize),
        }
    }

    /// Number of lanes in the plane.
    pub fn lanes(&self) -> u32 {
        self.slots.len() as u32
    }

    /// Sum `value` over every lane of the plane.
    pub fn sum(&self, lane: u32, value: f32) -> f32 {
        self.slots.store(lane, value);
        self.barrier.wait();

        let sum = (0..self.lanes()).map(|lane| self.slots.load(lane)).sum();

        self.barrier.wait();
        sum
    }

    /// Poison the plane barrier.
    pub fn poison(&self) {
        self.barrier.poison();
    }
}
