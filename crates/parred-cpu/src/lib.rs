//! A simulated massively parallel processor.
//!
//! Every work-item of a launch runs on its own OS thread. The lanes of a group are alive at
//! the same time, share their group memory and meet at real barriers; planes fold their
//! values in lock-step; global memory is made of atomics so concurrent groups can
//! accumulate into the same slot.

#[macro_use]
extern crate derive_new;


pub mod compute;
pub mod device;
pub mod runtime;

pub use device::CpuDevice;
pub use runtime::*;
