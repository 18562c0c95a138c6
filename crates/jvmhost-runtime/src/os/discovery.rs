//! Runtime library discovery.
//!
//! Resolution order, first match wins:
//!
//! 1. An explicit library path, used verbatim.
//! 2. A home hint, probed against the platform's candidate locations.
//! 3. The home environment variable, probed the same way.
//! 4. The bare library name, left to the platform loader's search path.
//!
//! The signal-chaining library is then looked for next to the runtime
//! library, at most two directory levels up, falling back to its bare name.
//! Discovery only checks file existence and never fails; a wrong guess
//! surfaces when the library is opened.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::locations::PlatformLayout;
use super::RuntimeLibraryPathInfo;

/// How many directory levels above the runtime library are searched for the
/// signal library.
pub const SIGNAL_LIBRARY_SEARCH_DEPTH: usize = 2;

fn non_empty(path: Option<&Path>) -> Option<&Path> {
    path.filter(|p| !p.as_os_str().is_empty())
}

fn exists(path: &Path) -> bool {
    std::fs::metadata(path).is_ok()
}

/// Probe the layout's candidate locations under `home`.
pub fn find_in_home(layout: &PlatformLayout, home: &Path) -> Option<PathBuf> {
    for candidate in layout.candidates(home) {
        if exists(&candidate) {
            debug!("Found runtime library at {:?}", candidate);
            return Some(candidate);
        }
        debug!("No runtime library at {:?}", candidate);
    }
    None
}

/// Look for the signal library beside `runtime_library`.
pub fn find_signal_library(layout: &PlatformLayout, runtime_library: &Path) -> PathBuf {
    let mut dir = runtime_library.parent();
    for _ in 0..SIGNAL_LIBRARY_SEARCH_DEPTH {
        let Some(current) = dir.filter(|d| !d.as_os_str().is_empty()) else {
            break;
        };
        let candidate = current.join(layout.signal_library);
        if exists(&candidate) {
            debug!("Found signal library at {:?}", candidate);
            return candidate;
        }
        dir = current.parent();
    }
    PathBuf::from(layout.signal_library)
}

/// Resolve the runtime and signal library paths.
///
/// `env_home` is only called when neither an explicit path nor a home hint
/// was given.
pub fn find_runtime_library<F>(
    layout: &PlatformLayout,
    explicit_path: Option<&Path>,
    home_hint: Option<&Path>,
    env_home: F,
) -> RuntimeLibraryPathInfo
where
    F: FnOnce() -> Option<OsString>,
{
    let mut runtime_home = None;
    let mut runtime_library = None;

    if let Some(explicit) = non_empty(explicit_path) {
        debug!("Using explicit runtime library {:?}", explicit);
        runtime_library = Some(explicit.to_path_buf());
    } else if let Some(home) = non_empty(home_hint) {
        debug!("Probing runtime home hint {:?}", home);
        runtime_home = Some(home.to_path_buf());
        runtime_library = find_in_home(layout, home);
    } else if let Some(home) = env_home().filter(|h| !h.is_empty()) {
        let home = PathBuf::from(home);
        debug!("Probing runtime home from environment {:?}", home);
        runtime_library = find_in_home(layout, &home);
        runtime_home = Some(home);
    }

    let runtime_library_path = runtime_library.unwrap_or_else(|| {
        debug!(
            "No runtime library located, falling back to {}",
            layout.runtime_library
        );
        PathBuf::from(layout.runtime_library)
    });
    let signal_library_path = find_signal_library(layout, &runtime_library_path);

    RuntimeLibraryPathInfo {
        runtime_home,
        runtime_library_path,
        signal_library_path,
    }
}
