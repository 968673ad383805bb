//! Parallel sum reduction on a simulated massively parallel device.
//!
//! Re-exports the device layer, the cpu device and the reduction strategies. The `parred`
//! binary runs the reduction described by the `[run]` section of `parred.toml`.

pub use parred_runtime::*;

pub use parred_cpu as cpu;
pub use parred_reduce as reduce;

mod run_config;
pub use run_config::*;
