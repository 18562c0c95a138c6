//! Dynamic shared object handles.
//!
//! [`DsoHandle`] is the one loader contract the rest of the crate sees. The
//! platform part is reduced to a [`NativeLoader`] (link, unlink, symbol
//! lookup) and [`LoadedDso`] implements the contract on top of it, so error
//! capture, re-open and dependency ownership behave identically everywhere.

#[cfg(unix)]
pub mod unix;
#[cfg(windows)]
pub mod windows;

use std::ffi::{c_void, CString};
use std::fmt;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

use tracing::{debug, trace, warn};

use crate::error::{HostError, HostResult};

/// Code reported when the platform gives no error code for a failed load.
pub const UNKNOWN_LOAD_ERROR: i32 = -1;

/// One native shared-library image.
pub trait DsoHandle: Send + Sync {
    /// Take ownership of a handle that must outlive this one.
    fn add_dependency(&mut self, handle: Box<dyn DsoHandle>);

    /// Load the image at `path`, closing any image already open.
    ///
    /// On failure the error code and message stay readable through
    /// [`errno`](Self::errno) and [`error`](Self::error), and the recorded
    /// path keeps its previous value.
    fn open(&mut self, path: &Path) -> HostResult<()>;

    fn is_loaded(&self) -> bool;

    /// Platform error code of the last failed open, `0` otherwise.
    fn errno(&self) -> i32;

    /// Loader message of the last failed open, empty otherwise.
    fn error(&self) -> &str;

    /// Resolve an exported symbol. `None` when unloaded or unresolved.
    fn symbol(&self, name: &str) -> Option<NonNull<c_void>>;

    /// Unload the image if loaded. Idempotent.
    fn close(&mut self);

    /// Path of the last image opened successfully.
    fn path(&self) -> &Path;
}

/// Failure details captured from the platform loader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadFailure {
    pub code: i32,
    pub message: String,
}

/// Platform primitives behind a [`LoadedDso`].
pub trait NativeLoader: 'static {
    /// Human-readable loader name for logs.
    const NAME: &'static str;

    /// Load the image at `path`, converting it to the native string form.
    fn link(path: &Path) -> Result<NonNull<c_void>, LoadFailure>;

    /// Unload an image returned by [`link`](Self::link).
    fn unlink(image: NonNull<c_void>) -> bool;

    /// Look up `name` in `image`.
    fn symbol(image: NonNull<c_void>, name: &std::ffi::CStr) -> Option<NonNull<c_void>>;
}

/// A [`DsoHandle`] over a platform [`NativeLoader`].
///
/// Dropping the handle unloads its own image first and then drops its
/// dependencies in the order they were added.
pub struct LoadedDso<L: NativeLoader> {
    image: Option<NonNull<c_void>>,
    errno: i32,
    error: String,
    path: PathBuf,
    dependencies: Vec<Box<dyn DsoHandle>>,
    _loader: PhantomData<fn() -> L>,
}

// SAFETY: the image pointer is an opaque loader token. Loading, unloading
// and symbol lookup are thread-safe in every supported loader, and mutation
// goes through `&mut self`.
unsafe impl<L: NativeLoader> Send for LoadedDso<L> {}
unsafe impl<L: NativeLoader> Sync for LoadedDso<L> {}

impl<L: NativeLoader> LoadedDso<L> {
    /// Create an unopened handle.
    pub fn new() -> Self {
        Self {
            image: None,
            errno: 0,
            error: String::new(),
            path: PathBuf::new(),
            dependencies: Vec::new(),
            _loader: PhantomData,
        }
    }

    /// Number of dependency handles owned by this one.
    pub fn dependency_count(&self) -> usize {
        self.dependencies.len()
    }
}

impl<L: NativeLoader> Default for LoadedDso<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: NativeLoader> fmt::Debug for LoadedDso<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedDso")
            .field("loader", &L::NAME)
            .field("loaded", &self.image.is_some())
            .field("path", &self.path)
            .field("errno", &self.errno)
            .field("dependencies", &self.dependencies.len())
            .finish()
    }
}

impl<L: NativeLoader> DsoHandle for LoadedDso<L> {
    fn add_dependency(&mut self, handle: Box<dyn DsoHandle>) {
        trace!("Adding dependency {:?} to {:?}", handle.path(), self.path);
        self.dependencies.push(handle);
    }

    fn open(&mut self, path: &Path) -> HostResult<()> {
        self.close();
        self.errno = 0;
        self.error.clear();

        match L::link(path) {
            Ok(image) => {
                debug!("{} loaded {:?}", L::NAME, path);
                self.image = Some(image);
                self.path = path.to_path_buf();
                Ok(())
            }
            Err(failure) => {
                warn!(
                    "{} failed to load {:?}: {} (code {})",
                    L::NAME,
                    path,
                    failure.message,
                    failure.code
                );
                self.errno = failure.code;
                self.error = failure.message.clone();
                Err(HostError::LibraryLoad {
                    path: path.to_path_buf(),
                    code: failure.code,
                    message: failure.message,
                })
            }
        }
    }

    fn is_loaded(&self) -> bool {
        self.image.is_some()
    }

    fn errno(&self) -> i32 {
        self.errno
    }

    fn error(&self) -> &str {
        &self.error
    }

    fn symbol(&self, name: &str) -> Option<NonNull<c_void>> {
        let image = self.image?;
        let name = CString::new(name).ok()?;
        L::symbol(image, &name)
    }

    fn close(&mut self) {
        if let Some(image) = self.image.take() {
            if !L::unlink(image) {
                warn!("{} failed to unload {:?}", L::NAME, self.path);
            } else {
                debug!("{} unloaded {:?}", L::NAME, self.path);
            }
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl<L: NativeLoader> Drop for LoadedDso<L> {
    fn drop(&mut self) {
        self.close();
    }
}
