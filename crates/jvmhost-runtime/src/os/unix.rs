use std::path::Path;

use crate::dso::unix::DlfcnHandle;
use crate::dso::DsoHandle;

use super::discovery;
use super::locations::{self, HOME_ENV};
use super::{OsHandler, RuntimeLibraryPathInfo};

/// Platform services on POSIX systems.
#[derive(Debug, Default)]
pub struct UnixOsHandler;

impl UnixOsHandler {
    pub fn new() -> Self {
        Self
    }
}

impl OsHandler for UnixOsHandler {
    fn find_runtime_library(
        &self,
        explicit_path: Option<&Path>,
        home_hint: Option<&Path>,
    ) -> RuntimeLibraryPathInfo {
        discovery::find_runtime_library(locations::current(), explicit_path, home_hint, || {
            std::env::var_os(HOME_ENV)
        })
    }

    fn create_dso_handle(&self) -> Box<dyn DsoHandle> {
        Box::new(DlfcnHandle::new())
    }

    fn current_pid(&self) -> i32 {
        // SAFETY: getpid has no preconditions.
        unsafe { libc::getpid() }
    }

    fn parent_pid(&self) -> i32 {
        // SAFETY: getppid has no preconditions.
        unsafe { libc::getppid() }
    }
}
