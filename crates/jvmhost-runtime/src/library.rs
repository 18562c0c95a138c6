//! Binding to the runtime's shared library.
//!
//! [`JvmLibrary`] owns the library handle and the four entry points resolved
//! from it. An entry point that did not resolve stays `None` and calling it
//! returns [`HostError::SymbolMissing`].

use std::ffi::c_void;
use std::fmt;
use std::path::Path;
use std::ptr;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::dso::DsoHandle;
use crate::error::{HostError, HostResult};
use crate::os::{OsHandler, RuntimeLibraryPathInfo};
use crate::sys::{
    jclass, jint, jsize, CreateJavaVMFn, DumpAllStacksFn, GetCreatedJavaVMsFn,
    GetDefaultJavaVMInitArgsFn, JNIEnv, JavaVM, JavaVMInitArgs, JNI_OK,
};

pub const GET_DEFAULT_INIT_ARGS_SYMBOL: &str = "JNI_GetDefaultJavaVMInitArgs";
pub const CREATE_JAVA_VM_SYMBOL: &str = "JNI_CreateJavaVM";
pub const GET_CREATED_JAVA_VMS_SYMBOL: &str = "JNI_GetCreatedJavaVMs";
pub const DUMP_ALL_STACKS_SYMBOL: &str = "JVM_DumpAllStacks";

/// The runtime's exported entry points.
#[derive(Debug, Clone, Copy, Default)]
pub struct EntryPoints {
    pub get_default_init_args: Option<GetDefaultJavaVMInitArgsFn>,
    pub create_java_vm: Option<CreateJavaVMFn>,
    pub get_created_java_vms: Option<GetCreatedJavaVMsFn>,
    pub dump_all_stacks: Option<DumpAllStacksFn>,
}

fn resolve<F: Copy>(handle: &dyn DsoHandle, name: &'static str) -> Option<F> {
    debug_assert_eq!(std::mem::size_of::<F>(), std::mem::size_of::<*mut c_void>());
    match handle.symbol(name) {
        // SAFETY: the symbol is exported by the runtime with the published
        // signature `F`; function and data pointers share a representation on
        // every supported platform.
        Some(sym) => Some(unsafe { std::mem::transmute_copy::<*mut c_void, F>(&sym.as_ptr()) }),
        None => {
            warn!("Runtime library does not export {}", name);
            None
        }
    }
}

impl EntryPoints {
    /// Resolve every entry point from an open handle.
    pub fn resolve(handle: &dyn DsoHandle) -> Self {
        Self {
            get_default_init_args: resolve(handle, GET_DEFAULT_INIT_ARGS_SYMBOL),
            create_java_vm: resolve(handle, CREATE_JAVA_VM_SYMBOL),
            get_created_java_vms: resolve(handle, GET_CREATED_JAVA_VMS_SYMBOL),
            dump_all_stacks: resolve(handle, DUMP_ALL_STACKS_SYMBOL),
        }
    }

    /// Check that all four entry points resolved.
    pub fn is_complete(&self) -> bool {
        self.get_default_init_args.is_some()
            && self.create_java_vm.is_some()
            && self.get_created_java_vms.is_some()
            && self.dump_all_stacks.is_some()
    }
}

/// The loaded runtime library.
pub struct JvmLibrary {
    os_handler: Arc<dyn OsHandler>,
    handle: Option<Box<dyn DsoHandle>>,
    linked: bool,
    load_errno: i32,
    load_error: String,
    entry_points: EntryPoints,
}

impl fmt::Debug for JvmLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JvmLibrary")
            .field("loaded", &self.is_loaded())
            .field("path", &self.jvm_path())
            .field("load_errno", &self.load_errno)
            .field("entry_points", &self.entry_points)
            .finish()
    }
}

impl JvmLibrary {
    /// Create an unloaded binding.
    pub fn new(os_handler: Arc<dyn OsHandler>) -> Self {
        Self {
            os_handler,
            handle: None,
            linked: false,
            load_errno: 0,
            load_error: String::new(),
            entry_points: EntryPoints::default(),
        }
    }

    /// Bind entry points already linked into the process.
    pub fn with_entry_points(os_handler: Arc<dyn OsHandler>, entry_points: EntryPoints) -> Self {
        Self {
            os_handler,
            handle: None,
            linked: true,
            load_errno: 0,
            load_error: String::new(),
            entry_points,
        }
    }

    pub fn os_handler(&self) -> &Arc<dyn OsHandler> {
        &self.os_handler
    }

    /// Load the runtime library described by `path_info`.
    ///
    /// With `use_signal_lib`, the signal library is opened first and kept
    /// alive as a dependency of the runtime library; if it fails to open,
    /// its error is returned and the runtime library is not attempted.
    pub fn load(&mut self, path_info: &RuntimeLibraryPathInfo, use_signal_lib: bool) -> HostResult<()> {
        self.close();

        let mut handle = self.os_handler.create_dso_handle();

        if use_signal_lib {
            let mut signal = self.os_handler.create_dso_handle();
            if let Err(e) = signal.open(&path_info.signal_library_path) {
                self.record_failure(signal.as_ref());
                return Err(e);
            }
            handle.add_dependency(signal);
        }

        if let Err(e) = handle.open(&path_info.runtime_library_path) {
            self.record_failure(handle.as_ref());
            return Err(e);
        }

        self.entry_points = EntryPoints::resolve(handle.as_ref());
        self.handle = Some(handle);
        self.load_errno = 0;
        self.load_error.clear();

        info!(
            "Loaded runtime library {:?} (entry points complete: {})",
            path_info.runtime_library_path,
            self.entry_points.is_complete()
        );
        Ok(())
    }

    /// Discover the runtime library and load it.
    pub fn discover_and_load(
        &mut self,
        explicit_path: Option<&Path>,
        home_hint: Option<&Path>,
        use_signal_lib: bool,
    ) -> HostResult<RuntimeLibraryPathInfo> {
        let info = self.os_handler.find_runtime_library(explicit_path, home_hint);
        self.load(&info, use_signal_lib)?;
        Ok(info)
    }

    fn record_failure(&mut self, handle: &dyn DsoHandle) {
        self.load_errno = handle.errno();
        self.load_error = handle.error().to_string();
    }

    /// Unload the library and forget its entry points.
    ///
    /// A binding made with [`JvmLibrary::with_entry_points`] is released
    /// too: afterwards it reports unloaded until the next [`JvmLibrary::load`].
    pub fn close(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            debug!("Closing runtime library {:?}", handle.path());
            handle.close();
        }
        self.linked = false;
        self.entry_points = EntryPoints::default();
    }

    pub fn is_loaded(&self) -> bool {
        self.linked || self.handle.as_ref().is_some_and(|h| h.is_loaded())
    }

    /// Check that the library is loaded and exports all four entry points.
    pub fn is_fully_resolved(&self) -> bool {
        self.is_loaded() && self.entry_points.is_complete()
    }

    pub fn load_errno(&self) -> i32 {
        self.load_errno
    }

    pub fn load_error(&self) -> &str {
        &self.load_error
    }

    /// Path the runtime library was opened from.
    pub fn jvm_path(&self) -> Option<&Path> {
        self.handle.as_ref().map(|h| h.path())
    }

    pub fn entry_points(&self) -> &EntryPoints {
        &self.entry_points
    }

    /// Call `JNI_GetDefaultJavaVMInitArgs`.
    ///
    /// # Safety
    ///
    /// `args` must point to a valid, writable `JavaVMInitArgs`.
    pub unsafe fn get_default_init_args(&self, args: *mut JavaVMInitArgs) -> HostResult<jint> {
        let f = self
            .entry_points
            .get_default_init_args
            .ok_or(HostError::SymbolMissing(GET_DEFAULT_INIT_ARGS_SYMBOL))?;
        Ok(f(args.cast()))
    }

    /// Call `JNI_CreateJavaVM`.
    ///
    /// # Safety
    ///
    /// `pvm` and `penv` must be writable, and `args` must stay valid for
    /// the duration of the call.
    pub unsafe fn create_java_vm(
        &self,
        pvm: *mut *mut JavaVM,
        penv: *mut *mut JNIEnv,
        args: *mut JavaVMInitArgs,
    ) -> HostResult<jint> {
        let f = self
            .entry_points
            .create_java_vm
            .ok_or(HostError::SymbolMissing(CREATE_JAVA_VM_SYMBOL))?;
        Ok(f(pvm, penv.cast(), args.cast()))
    }

    /// Runtime instances already created in this process.
    pub fn created_vms(&self) -> HostResult<Vec<*mut JavaVM>> {
        let f = self
            .entry_points
            .get_created_java_vms
            .ok_or(HostError::SymbolMissing(GET_CREATED_JAVA_VMS_SYMBOL))?;

        let mut count: jsize = 0;
        // SAFETY: a zero-length query only writes the count.
        let rc = unsafe { f(ptr::null_mut(), 0, &mut count) };
        if rc != JNI_OK {
            return Err(HostError::Jni {
                operation: GET_CREATED_JAVA_VMS_SYMBOL,
                code: rc,
            });
        }
        if count <= 0 {
            return Ok(Vec::new());
        }

        let mut vms = vec![ptr::null_mut(); count as usize];
        // SAFETY: the buffer holds `count` slots.
        let rc = unsafe { f(vms.as_mut_ptr(), count, &mut count) };
        if rc != JNI_OK {
            return Err(HostError::Jni {
                operation: GET_CREATED_JAVA_VMS_SYMBOL,
                code: rc,
            });
        }
        vms.truncate(count.max(0) as usize);
        Ok(vms)
    }

    /// Call `JVM_DumpAllStacks`.
    ///
    /// # Safety
    ///
    /// `env` must be the calling thread's execution context.
    pub unsafe fn dump_all_stacks(&self, env: *mut JNIEnv, class: jclass) -> HostResult<()> {
        let f = self
            .entry_points
            .dump_all_stacks
            .ok_or(HostError::SymbolMissing(DUMP_ALL_STACKS_SYMBOL))?;
        f(env, class);
        Ok(())
    }
}

impl Drop for JvmLibrary {
    fn drop(&mut self) {
        self.close();
    }
}
