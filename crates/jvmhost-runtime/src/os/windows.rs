use std::ffi::c_void;
use std::path::Path;

use tracing::debug;

use crate::dso::windows::ModuleHandle;
use crate::dso::DsoHandle;

use super::discovery;
use super::locations::{self, HOME_ENV};
use super::{OsHandler, RuntimeLibraryPathInfo};

const TH32CS_SNAPPROCESS: u32 = 0x0000_0002;
const INVALID_HANDLE_VALUE: *mut c_void = -1isize as *mut c_void;
const MAX_PATH: usize = 260;

#[repr(C)]
struct ProcessEntry32W {
    size: u32,
    usage: u32,
    process_id: u32,
    default_heap_id: usize,
    module_id: u32,
    threads: u32,
    parent_process_id: u32,
    priority_class_base: i32,
    flags: u32,
    exe_file: [u16; MAX_PATH],
}

#[link(name = "kernel32")]
extern "system" {
    fn GetCurrentProcessId() -> u32;
    fn CreateToolhelp32Snapshot(flags: u32, process_id: u32) -> *mut c_void;
    fn Process32FirstW(snapshot: *mut c_void, entry: *mut ProcessEntry32W) -> i32;
    fn Process32NextW(snapshot: *mut c_void, entry: *mut ProcessEntry32W) -> i32;
    fn CloseHandle(handle: *mut c_void) -> i32;
}

/// Closes a toolhelp snapshot on every exit path.
struct Snapshot(*mut c_void);

impl Drop for Snapshot {
    fn drop(&mut self) {
        // SAFETY: the handle is a valid snapshot owned by this guard.
        unsafe { CloseHandle(self.0) };
    }
}

/// Platform services on Windows.
#[derive(Debug, Default)]
pub struct WindowsOsHandler;

impl WindowsOsHandler {
    pub fn new() -> Self {
        Self
    }
}

impl OsHandler for WindowsOsHandler {
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
        Box::new(ModuleHandle::new())
    }

    fn current_pid(&self) -> i32 {
        // SAFETY: no preconditions.
        unsafe { GetCurrentProcessId() as i32 }
    }

    fn parent_pid(&self) -> i32 {
        // SAFETY: no preconditions.
        let pid = unsafe { GetCurrentProcessId() };
        // SAFETY: the returned handle is checked before use.
        let raw = unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0) };
        if raw == INVALID_HANDLE_VALUE || raw.is_null() {
            debug!("Process snapshot unavailable");
            return -1;
        }
        let snapshot = Snapshot(raw);

        // SAFETY: an all-zero entry is a valid value for this plain struct.
        let mut entry: ProcessEntry32W = unsafe { std::mem::zeroed() };
        entry.size = std::mem::size_of::<ProcessEntry32W>() as u32;

        // SAFETY: `entry.size` is initialised as the API requires.
        let mut more = unsafe { Process32FirstW(snapshot.0, &mut entry) } != 0;
        while more {
            if entry.process_id == pid {
                return entry.parent_process_id as i32;
            }
            // SAFETY: same snapshot and entry as above.
            more = unsafe { Process32NextW(snapshot.0, &mut entry) } != 0;
        }
        -1
    }
}
