//! `dlopen`-based loader.

use std::ffi::{c_void, CStr, CString};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::ptr::NonNull;

use super::{LoadFailure, LoadedDso, NativeLoader, UNKNOWN_LOAD_ERROR};

/// POSIX dynamic loader. Images are opened `RTLD_NOW | RTLD_GLOBAL` so the
/// runtime's own dependencies can bind against symbols it exports.
pub struct Dlfcn;

/// Handle type produced by the Unix platform handler.
pub type DlfcnHandle = LoadedDso<Dlfcn>;

fn last_dl_error() -> String {
    // SAFETY: dlerror returns either null or a NUL-terminated string owned by
    // the loader, valid until the next dl* call on this thread.
    unsafe {
        let msg = libc::dlerror();
        if msg.is_null() {
            String::new()
        } else {
            CStr::from_ptr(msg).to_string_lossy().into_owned()
        }
    }
}

#[cfg(any(target_os = "linux", target_os = "emscripten", target_os = "redox"))]
pub(crate) unsafe fn errno_location() -> *mut libc::c_int {
    libc::__errno_location()
}

#[cfg(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "dragonfly"
))]
pub(crate) unsafe fn errno_location() -> *mut libc::c_int {
    libc::__error()
}

#[cfg(any(target_os = "android", target_os = "netbsd", target_os = "openbsd"))]
pub(crate) unsafe fn errno_location() -> *mut libc::c_int {
    libc::__errno()
}

fn clear_errno() {
    // SAFETY: the location is this thread's errno slot.
    unsafe { *errno_location() = 0 };
}

impl NativeLoader for Dlfcn {
    const NAME: &'static str = "dlfcn";

    fn link(path: &Path) -> Result<NonNull<c_void>, LoadFailure> {
        let native = CString::new(path.as_os_str().as_bytes()).map_err(|_| LoadFailure {
            code: libc::EINVAL,
            message: format!("path contains a NUL byte: {}", path.display()),
        })?;

        // Drop any stale message so the one read below belongs to this call.
        let _ = last_dl_error();
        // dlopen does not always set errno; a leftover value must not leak
        // into the failure code.
        clear_errno();

        // SAFETY: `native` is a valid NUL-terminated path.
        let image = unsafe { libc::dlopen(native.as_ptr(), libc::RTLD_NOW | libc::RTLD_GLOBAL) };
        match NonNull::new(image) {
            Some(image) => Ok(image),
            None => {
                let code = std::io::Error::last_os_error()
                    .raw_os_error()
                    .filter(|code| *code != 0)
                    .unwrap_or(UNKNOWN_LOAD_ERROR);
                let mut message = last_dl_error();
                if message.is_empty() {
                    message = format!("unable to load {}", path.display());
                }
                Err(LoadFailure { code, message })
            }
        }
    }

    fn unlink(image: NonNull<c_void>) -> bool {
        // SAFETY: `image` came from a successful dlopen and is closed once.
        unsafe { libc::dlclose(image.as_ptr()) == 0 }
    }

    fn symbol(image: NonNull<c_void>, name: &CStr) -> Option<NonNull<c_void>> {
        // SAFETY: `image` is a live dlopen handle and `name` is NUL-terminated.
        NonNull::new(unsafe { libc::dlsym(image.as_ptr(), name.as_ptr()) })
    }
}
