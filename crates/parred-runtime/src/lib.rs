#![warn(missing_docs)]

//! Parred runtime crate: the device layer the reduction kernels are written against.
//!
//! A backend implements [`server::ComputeServer`]; host code talks to it through a
//! [`client::ComputeClient`], compiles named entry points of a [`kernel::KernelLibrary`]
//! into [`kernel::Pipeline`]s and submits [`command::CommandBuffer`]s of launches.

#[macro_use]
extern crate derive_new;

mod id;

/// Command buffer module.
pub mod command;
/// Compute client module.
pub mod client;
/// Configuration module.
pub mod config;
/// Kernel ABI module.
pub mod kernel;
/// Launch logging module.
pub mod logging;
/// Device memory module.
pub mod memory;
/// Compute server module.
pub mod server;
/// Group and plane synchronization primitives.
pub mod sync;

mod runtime;
pub use runtime::*;
