//! Windows module loader.
//!
//! Paths arrive as `Path` and are widened to UTF-16 here; loader messages
//! come back as UTF-16 and are narrowed to UTF-8 here.

use std::ffi::{c_char, c_void, CStr};
use std::os::windows::ffi::OsStrExt;
use std::path::Path;
use std::ptr::{self, NonNull};

use super::{LoadFailure, LoadedDso, NativeLoader, UNKNOWN_LOAD_ERROR};

const FORMAT_MESSAGE_FROM_SYSTEM: u32 = 0x0000_1000;
const FORMAT_MESSAGE_IGNORE_INSERTS: u32 = 0x0000_0200;
const MESSAGE_BUFFER_LEN: usize = 1024;
const ERROR_INVALID_PARAMETER: i32 = 87;

#[link(name = "kernel32")]
extern "system" {
    fn LoadLibraryW(file_name: *const u16) -> *mut c_void;
    fn FreeLibrary(module: *mut c_void) -> i32;
    fn GetProcAddress(module: *mut c_void, name: *const c_char) -> *mut c_void;
    fn GetLastError() -> u32;
    fn FormatMessageW(
        flags: u32,
        source: *const c_void,
        message_id: u32,
        language_id: u32,
        buffer: *mut u16,
        size: u32,
        arguments: *mut c_void,
    ) -> u32;
}

/// `LoadLibraryW`-based loader.
pub struct Kernel32;

/// Handle type produced by the Windows platform handler.
pub type ModuleHandle = LoadedDso<Kernel32>;

/// Widen `path` to NUL-terminated UTF-16, or `None` if it already holds a NUL.
fn to_wide(path: &Path) -> Option<Vec<u16>> {
    let mut wide: Vec<u16> = path.as_os_str().encode_wide().collect();
    if wide.contains(&0) {
        return None;
    }
    wide.push(0);
    Some(wide)
}

fn system_message(code: u32) -> String {
    let mut buffer = vec![0u16; MESSAGE_BUFFER_LEN];
    // SAFETY: the buffer is writable for `MESSAGE_BUFFER_LEN` UTF-16 units.
    let written = unsafe {
        FormatMessageW(
            FORMAT_MESSAGE_FROM_SYSTEM | FORMAT_MESSAGE_IGNORE_INSERTS,
            ptr::null(),
            code,
            0,
            buffer.as_mut_ptr(),
            MESSAGE_BUFFER_LEN as u32,
            ptr::null_mut(),
        )
    };
    String::from_utf16_lossy(&buffer[..written as usize])
        .trim_end()
        .to_string()
}

impl NativeLoader for Kernel32 {
    const NAME: &'static str = "kernel32";

    fn link(path: &Path) -> Result<NonNull<c_void>, LoadFailure> {
        let wide = to_wide(path).ok_or_else(|| LoadFailure {
            code: ERROR_INVALID_PARAMETER,
            message: format!("path contains a NUL character: {}", path.display()),
        })?;
        // SAFETY: `wide` is NUL-terminated UTF-16.
        let module = unsafe { LoadLibraryW(wide.as_ptr()) };
        match NonNull::new(module) {
            Some(module) => Ok(module),
            None => {
                // SAFETY: reads the calling thread's last-error value.
                let raw = unsafe { GetLastError() };
                let code = if raw == 0 {
                    UNKNOWN_LOAD_ERROR
                } else {
                    raw as i32
                };
                let mut message = system_message(raw);
                if message.is_empty() {
                    message = format!("unable to load {}", path.display());
                }
                Err(LoadFailure { code, message })
            }
        }
    }

    fn unlink(image: NonNull<c_void>) -> bool {
        // SAFETY: `image` came from a successful LoadLibraryW.
        unsafe { FreeLibrary(image.as_ptr()) != 0 }
    }

    fn symbol(image: NonNull<c_void>, name: &CStr) -> Option<NonNull<c_void>> {
        // SAFETY: `image` is a live module and `name` is NUL-terminated ANSI.
        NonNull::new(unsafe { GetProcAddress(image.as_ptr(), name.as_ptr()) })
    }
}
