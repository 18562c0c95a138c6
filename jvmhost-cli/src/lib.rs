//! # jvmhost-cli
//!
//! Configuration and commands behind the `jvmhost` binary.

pub mod commands;
pub mod config;
