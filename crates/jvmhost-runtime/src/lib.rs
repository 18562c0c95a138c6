//! # jvmhost-runtime
//!
//! Locates, loads and drives a Java virtual machine embedded in the host
//! process.
//!
//! This crate provides:
//! - Runtime library discovery from an explicit path, a home directory or
//!   `JAVA_HOME`
//! - Shared library handles with error capture and owned dependencies
//! - A typed binding to the runtime's exported entry points
//! - The runtime instance lifecycle: create, destroy, attach and detach
//! - A tracked memory pool for strings handed to the runtime
//!
//! ## Platforms
//!
//! POSIX systems load through `dlopen`, Windows through `LoadLibraryW`.
//! [`os::create`] selects the platform handler once; nothing else in the
//! crate branches on the platform.
//!
//! ## Threads
//!
//! `Vm::init` and `Vm::destroy` must be serialized by the caller. Threads
//! attach and detach independently through a [`VmHandle`].

pub mod arena;
pub mod dso;
pub mod error;
pub mod library;
pub mod options;
pub mod os;
pub mod sys;
pub mod vm;

pub use arena::{MemoryPool, PoolScope, SimpleMemoryPool};
pub use dso::{DsoHandle, LoadedDso, NativeLoader};
pub use error::{HostError, HostResult};
pub use library::{EntryPoints, JvmLibrary};
pub use options::{InitOption, OptionVector};
pub use os::{OsHandler, RuntimeLibraryPathInfo};
pub use vm::{AttachGuard, Vm, VmHandle, VmState};
