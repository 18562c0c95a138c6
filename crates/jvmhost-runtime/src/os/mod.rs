//! Platform services: library handles, runtime discovery and process ids.
//!
//! One [`OsHandler`] implementation exists per platform family and
//! [`create`] picks it once; nothing above this module branches on the
//! platform.

pub mod discovery;
pub mod locations;

#[cfg(unix)]
mod unix;
#[cfg(windows)]
mod windows;

#[cfg(unix)]
pub use unix::UnixOsHandler;
#[cfg(windows)]
pub use windows::WindowsOsHandler;

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::dso::DsoHandle;
use crate::error::HostResult;

/// Where the runtime and its signal library were found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuntimeLibraryPathInfo {
    /// Home directory the runtime library was searched under, if any.
    pub runtime_home: Option<PathBuf>,
    pub runtime_library_path: PathBuf,
    pub signal_library_path: PathBuf,
}

/// Platform-specific services.
pub trait OsHandler: Send + Sync {
    /// Locate the runtime library; see [`discovery`] for the order.
    fn find_runtime_library(
        &self,
        explicit_path: Option<&Path>,
        home_hint: Option<&Path>,
    ) -> RuntimeLibraryPathInfo;

    /// Create an unopened library handle for this platform.
    fn create_dso_handle(&self) -> Box<dyn DsoHandle>;

    /// Create a handle and open `path` with it.
    fn load_library(&self, path: &Path) -> HostResult<Box<dyn DsoHandle>> {
        let mut handle = self.create_dso_handle();
        handle.open(path)?;
        Ok(handle)
    }

    fn current_pid(&self) -> i32;

    /// Parent process id, or `-1` when it cannot be determined.
    fn parent_pid(&self) -> i32;
}

/// Platform handler for the running platform.
pub fn create() -> Arc<dyn OsHandler> {
    #[cfg(unix)]
    {
        Arc::new(UnixOsHandler::new())
    }
    #[cfg(windows)]
    {
        Arc::new(WindowsOsHandler::new())
    }
}
