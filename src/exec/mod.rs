// src/exec/mod.rs

//! Process execution layer.
//!
//! - [`command`] turns the configuration into the toolchain command line.
//! - [`process`] spawns the toolchain, forwards its output lines and exit as
//!   [`SessionEvent`](crate::engine::SessionEvent)s, and exposes the
//!   [`SupervisedProcess`] seam the supervisor kills it through.
//! - [`terminator`] kills the toolchain together with the helpers its wrapper
//!   scripts spawn.

pub mod command;
pub mod process;
pub mod terminator;

pub use command::ToolchainCommand;
pub use process::{spawn_toolchain, SupervisedProcess, ToolchainProcess, EVENT_CHANNEL_CAPACITY};
pub use terminator::ProcessTerminator;
