//! Host process for the layer-2 switch simulator.
//!
//! Wires a [`Fabric`](l2sim_common::Fabric), a running
//! [`Switch`](l2sim_switchd::Switch) and the stations launched by the
//! operator behind a line-oriented [`Console`].

pub mod console;

pub use console::{Command, Console, ConsoleError, ConsoleResult, Reply, HELP};
