//! Runtime instance lifecycle.
//!
//! A [`Vm`] moves between two states: `Uninitialized` and `Running`.
//! [`Vm::init`] always leaves a fresh session (a running one is destroyed
//! first) and [`Vm::destroy`] always returns to `Uninitialized`, whatever the
//! runtime reports.
//!
//! `init` and `destroy` are not synchronized; callers serialize them.
//! Attaching and detaching threads goes through [`VmHandle`], which may be
//! copied to other threads. An execution context must only be used on the
//! thread it was issued to.

use std::ffi::{c_void, CStr};
use std::marker::PhantomData;
use std::ptr;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::arena::{MemoryPool, PoolScope, SimpleMemoryPool};
use crate::error::{HostError, HostResult};
use crate::library::JvmLibrary;
use crate::options::{InitOption, OptionVector};
use crate::sys::{
    jclass, jint, jvalue, JNIEnv, JNIInvokeInterface_, JNINativeInterface_, JavaVM,
    JavaVMInitArgs, JNI_EDETACHED, JNI_ERR, JNI_FALSE, JNI_OK, JNI_VERSION_1_8,
};

const SYSTEM_CLASS: &CStr = c"java/lang/System";
const EXIT_METHOD: &CStr = c"exit";
const EXIT_SIGNATURE: &CStr = c"(I)V";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmState {
    Uninitialized,
    Running,
}

unsafe fn invoke_table<'a>(vm: *mut JavaVM) -> &'a JNIInvokeInterface_ {
    &**vm
}

unsafe fn native_table<'a>(env: *mut JNIEnv) -> &'a JNINativeInterface_ {
    &**env
}

/// Describe and clear a pending exception. Returns whether one was pending.
unsafe fn clear_pending_exception(env: *mut JNIEnv) -> bool {
    let table = native_table(env);
    let pending = match table.exception_check {
        Some(check) => check(env) != JNI_FALSE,
        None => false,
    };
    if pending {
        if let Some(describe) = table.exception_describe {
            describe(env);
        }
        if let Some(clear) = table.exception_clear {
            clear(env);
        }
    }
    pending
}

/// Thread-independent handle to a running runtime instance.
///
/// Each method acts only on the calling thread's context, so copies may be
/// used concurrently from different threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmHandle {
    jvm: *mut JavaVM,
}

// SAFETY: the invocation interface may be called from any thread.
unsafe impl Send for VmHandle {}
unsafe impl Sync for VmHandle {}

impl VmHandle {
    /// # Safety
    ///
    /// `jvm` must point to a live runtime instance for as long as the handle
    /// is used.
    pub unsafe fn from_raw(jvm: *mut JavaVM) -> Self {
        Self { jvm }
    }

    pub fn as_raw(&self) -> *mut JavaVM {
        self.jvm
    }

    fn table(&self) -> &JNIInvokeInterface_ {
        // SAFETY: `from_raw` requires a live instance.
        unsafe { invoke_table(self.jvm) }
    }

    /// Context of the calling thread, or `None` when it is not attached.
    pub fn current_env(&self) -> HostResult<Option<*mut JNIEnv>> {
        let get_env = self.table().get_env.ok_or(HostError::SymbolMissing("GetEnv"))?;
        let mut env: *mut c_void = ptr::null_mut();
        // SAFETY: `env` is a valid out pointer.
        let rc = unsafe { get_env(self.jvm, &mut env, JNI_VERSION_1_8) };
        match rc {
            JNI_OK => Ok(Some(env.cast())),
            JNI_EDETACHED => Ok(None),
            code => Err(HostError::Jni {
                operation: "GetEnv",
                code,
            }),
        }
    }

    /// Attach the calling thread if needed.
    ///
    /// Returns the thread's context and whether this call attached it. Only
    /// a caller that received `true` should detach the thread again.
    pub fn attach_thread_env(&self) -> HostResult<(*mut JNIEnv, bool)> {
        if let Some(env) = self.current_env()? {
            return Ok((env, false));
        }

        let attach = self
            .table()
            .attach_current_thread
            .ok_or(HostError::SymbolMissing("AttachCurrentThread"))?;
        let mut env: *mut c_void = ptr::null_mut();
        // SAFETY: `env` is a valid out pointer; null attach arguments request
        // the defaults.
        let rc = unsafe { attach(self.jvm, &mut env, ptr::null_mut()) };
        if rc != JNI_OK {
            return Err(HostError::Jni {
                operation: "AttachCurrentThread",
                code: rc,
            });
        }
        debug!("Attached thread {:?}", std::thread::current().id());
        Ok((env.cast(), true))
    }

    /// Attach the calling thread if needed; see [`Self::attach_thread_env`].
    pub fn attach_thread(&self) -> HostResult<bool> {
        self.attach_thread_env().map(|(_, attached)| attached)
    }

    /// Detach the calling thread.
    ///
    /// A thread without a context is not checked for; the runtime reports it.
    pub fn detach_thread(&self) -> HostResult<()> {
        let detach = self
            .table()
            .detach_current_thread
            .ok_or(HostError::SymbolMissing("DetachCurrentThread"))?;
        // SAFETY: acts on the calling thread only.
        let rc = unsafe { detach(self.jvm) };
        if rc != JNI_OK {
            return Err(HostError::Jni {
                operation: "DetachCurrentThread",
                code: rc,
            });
        }
        debug!("Detached thread {:?}", std::thread::current().id());
        Ok(())
    }

    /// Attach for the lifetime of the returned guard.
    pub fn attach_current(&self) -> HostResult<AttachGuard> {
        let (env, attached) = self.attach_thread_env()?;
        Ok(AttachGuard {
            handle: *self,
            env,
            attached,
            _thread: PhantomData,
        })
    }
}

/// Scoped thread attachment.
///
/// Detaches on drop only when it attached the thread itself. Not `Send`:
/// the context belongs to the thread that created the guard.
#[derive(Debug)]
pub struct AttachGuard {
    handle: VmHandle,
    env: *mut JNIEnv,
    attached: bool,
    _thread: PhantomData<*const ()>,
}

impl AttachGuard {
    pub fn env(&self) -> *mut JNIEnv {
        self.env
    }

    /// Whether this guard attached the thread.
    pub fn attached(&self) -> bool {
        self.attached
    }
}

impl Drop for AttachGuard {
    fn drop(&mut self) {
        if self.attached {
            if let Err(e) = self.handle.detach_thread() {
                warn!("Failed to detach thread: {}", e);
            }
        }
    }
}

/// An embedded runtime instance.
#[derive(Debug)]
pub struct Vm {
    library: Arc<JvmLibrary>,
    jvm: *mut JavaVM,
    env: *mut JNIEnv,
    system_class: jclass,
}

impl Vm {
    /// Create an uninitialized instance over a loaded library.
    pub fn new(library: Arc<JvmLibrary>) -> Self {
        Self {
            library,
            jvm: ptr::null_mut(),
            env: ptr::null_mut(),
            system_class: ptr::null_mut(),
        }
    }

    pub fn library(&self) -> &Arc<JvmLibrary> {
        &self.library
    }

    pub fn state(&self) -> VmState {
        if self.jvm.is_null() {
            VmState::Uninitialized
        } else {
            VmState::Running
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == VmState::Running
    }

    /// Native runtime pointer; null when not running.
    pub fn jvm(&self) -> *mut JavaVM {
        self.jvm
    }

    /// Context issued to the thread that created the runtime.
    pub fn env(&self) -> *mut JNIEnv {
        self.env
    }

    /// Global reference to `java.lang.System`, or null.
    pub fn system_class(&self) -> jclass {
        self.system_class
    }

    /// Create a runtime session.
    ///
    /// A running session is destroyed first. Options are copied into `pool`
    /// (or a local pool when none is given) and every allocation made here
    /// is released before returning. A refused creation yields
    /// [`HostError::CreateFailed`] with the runtime's own code.
    pub fn init(
        &mut self,
        classpath: Option<&str>,
        custom_options: Option<&[InitOption]>,
        pool: Option<&mut dyn MemoryPool>,
    ) -> HostResult<()> {
        if self.is_running() {
            debug!("Destroying running session before re-initialising");
            if let Err(e) = self.destroy() {
                warn!("Previous session did not shut down cleanly: {}", e);
            }
        }

        let os = self.library.os_handler();
        let options = OptionVector::build(
            self.default_options(),
            custom_options.unwrap_or_default(),
            classpath,
            os.parent_pid(),
            os.current_pid(),
        );
        debug!("Creating runtime with {} options", options.len());

        let mut fallback = SimpleMemoryPool::new();
        let pool: &mut dyn MemoryPool = match pool {
            Some(pool) => pool,
            None => &mut fallback,
        };
        let mut scope = PoolScope::new(pool);
        let mut args = options.materialize(&mut scope, JNI_VERSION_1_8)?;

        let mut jvm: *mut JavaVM = ptr::null_mut();
        let mut env: *mut JNIEnv = ptr::null_mut();
        // SAFETY: the out pointers are writable and `args` stays alive for the
        // whole call.
        let rc = unsafe { self.library.create_java_vm(&mut jvm, &mut env, args.as_mut_ptr())? };
        if rc != JNI_OK || jvm.is_null() {
            // A success code without a runtime is still a failure.
            let code = if rc == JNI_OK { JNI_ERR } else { rc };
            warn!("Runtime creation failed with code {}", code);
            return Err(HostError::CreateFailed { code });
        }

        self.jvm = jvm;
        self.env = env;
        // SAFETY: `env` was just issued to this thread.
        self.system_class = unsafe { resolve_system_class(env) };

        info!("Runtime instance created");
        Ok(())
    }

    fn default_options(&self) -> Vec<InitOption> {
        let mut args = JavaVMInitArgs {
            version: JNI_VERSION_1_8,
            n_options: 0,
            options: ptr::null_mut(),
            ignore_unrecognized: JNI_FALSE,
        };
        // SAFETY: `args` is a valid, writable structure.
        match unsafe { self.library.get_default_init_args(&mut args) } {
            Ok(JNI_OK) => {}
            Ok(code) => {
                debug!("No default options (code {})", code);
                return Vec::new();
            }
            Err(e) => {
                debug!("No default options: {}", e);
                return Vec::new();
            }
        }
        if args.options.is_null() || args.n_options <= 0 {
            return Vec::new();
        }

        (0..args.n_options as usize)
            .filter_map(|index| {
                // SAFETY: the runtime reported `n_options` entries.
                let option = unsafe { &*args.options.add(index) };
                if option.option_string.is_null() {
                    return None;
                }
                // SAFETY: option strings are NUL-terminated.
                let text = unsafe { CStr::from_ptr(option.option_string) };
                Some(InitOption::with_extra_info(
                    text.to_string_lossy().into_owned(),
                    option.extra_info,
                ))
            })
            .collect()
    }

    /// Destroy the running session.
    ///
    /// Held handles are cleared even when the runtime reports a failure.
    /// Returns [`HostError::NotRunning`] (code `-1`) when there is no
    /// session.
    pub fn destroy(&mut self) -> HostResult<()> {
        if !self.is_running() {
            return Err(HostError::NotRunning);
        }

        let handle = VmHandle { jvm: self.jvm };
        let system_class = std::mem::replace(&mut self.system_class, ptr::null_mut());
        self.jvm = ptr::null_mut();
        self.env = ptr::null_mut();

        if !system_class.is_null() {
            if let Ok(Some(env)) = handle.current_env() {
                // SAFETY: `env` belongs to the calling thread and the
                // reference was created by this instance.
                unsafe {
                    if let Some(delete) = native_table(env).delete_global_ref {
                        delete(env, system_class);
                    }
                }
            }
        }

        let destroy = handle
            .table()
            .destroy_java_vm
            .ok_or(HostError::SymbolMissing("DestroyJavaVM"))?;
        // SAFETY: the instance is live until this call returns.
        let rc = unsafe { destroy(handle.jvm) };
        if rc != JNI_OK {
            warn!("DestroyJavaVM returned {}", rc);
            return Err(HostError::Jni {
                operation: "DestroyJavaVM",
                code: rc,
            });
        }

        info!("Runtime instance destroyed");
        Ok(())
    }

    /// Handle usable from other threads.
    pub fn handle(&self) -> HostResult<VmHandle> {
        if !self.is_running() {
            return Err(HostError::NotRunning);
        }
        Ok(VmHandle { jvm: self.jvm })
    }

    pub fn attach_thread(&self) -> HostResult<bool> {
        self.handle()?.attach_thread()
    }

    pub fn attach_thread_env(&self) -> HostResult<(*mut JNIEnv, bool)> {
        self.handle()?.attach_thread_env()
    }

    pub fn detach_thread(&self) -> HostResult<()> {
        self.handle()?.detach_thread()
    }

    pub fn attach_current(&self) -> HostResult<AttachGuard> {
        self.handle()?.attach_current()
    }

    /// Run `System.exit(code)` in the runtime.
    ///
    /// With the exit hook installed this normally terminates the process.
    pub fn call_exit(&self, code: jint) -> HostResult<()> {
        let guard = self.attach_current()?;
        let env = guard.env();
        if self.system_class.is_null() {
            return Err(HostError::ClassNotFound(
                SYSTEM_CLASS.to_string_lossy().into_owned(),
            ));
        }

        // SAFETY: `env` belongs to the calling thread for the guard's lifetime
        // and the class reference is global.
        unsafe {
            let table = native_table(env);
            let get_method = table
                .get_static_method_id
                .ok_or(HostError::SymbolMissing("GetStaticMethodID"))?;
            let call = table
                .call_static_void_method_a
                .ok_or(HostError::SymbolMissing("CallStaticVoidMethodA"))?;

            let method = get_method(
                env,
                self.system_class,
                EXIT_METHOD.as_ptr(),
                EXIT_SIGNATURE.as_ptr(),
            );
            if method.is_null() {
                clear_pending_exception(env);
                return Err(HostError::MethodNotFound {
                    class: SYSTEM_CLASS.to_string_lossy().into_owned(),
                    name: EXIT_METHOD.to_string_lossy().into_owned(),
                    signature: EXIT_SIGNATURE.to_string_lossy().into_owned(),
                });
            }

            info!("Calling System.exit({})", code);
            let args = [jvalue { i: code }];
            call(env, self.system_class, method, args.as_ptr());
            if clear_pending_exception(env) {
                return Err(HostError::JavaException("System.exit"));
            }
        }
        Ok(())
    }

    /// Print every thread's stack through the runtime.
    pub fn dump_all_stacks(&self) -> HostResult<()> {
        let guard = self.attach_current()?;
        // SAFETY: the guard's context belongs to this thread.
        unsafe { self.library.dump_all_stacks(guard.env(), ptr::null_mut()) }
    }
}

impl Drop for Vm {
    fn drop(&mut self) {
        if self.is_running() {
            if let Err(e) = self.destroy() {
                warn!("Failed to destroy runtime instance: {}", e);
            }
        }
    }
}

/// Look up `java.lang.System` and promote it to a global reference.
unsafe fn resolve_system_class(env: *mut JNIEnv) -> jclass {
    if env.is_null() {
        return ptr::null_mut();
    }
    let table = native_table(env);
    let Some(find_class) = table.find_class else {
        return ptr::null_mut();
    };

    let local = find_class(env, SYSTEM_CLASS.as_ptr());
    if local.is_null() {
        warn!("Could not resolve {:?}", SYSTEM_CLASS);
        clear_pending_exception(env);
        return ptr::null_mut();
    }

    let global = match table.new_global_ref {
        Some(new_global_ref) => new_global_ref(env, local),
        None => ptr::null_mut(),
    };
    if let Some(delete_local) = table.delete_local_ref {
        delete_local(env, local);
    }
    global
}
