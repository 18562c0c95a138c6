//! In-process stand-in for a Java runtime.
//!
//! Real invocation and native function tables populated with
//! `extern "system"` functions. State is thread-local so tests running in
//! parallel do not observe each other; "attached" is naturally per thread.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::ffi::{c_char, c_void, CStr};
use std::ptr;
use std::sync::{Arc, OnceLock};

use jvmhost_runtime::library::EntryPoints;
use jvmhost_runtime::sys::{
    jboolean, jclass, jint, jmethodID, jobject, jsize, jvalue, JNIEnv, JNIInvokeInterface_,
    JNINativeInterface_, JavaVM, JavaVMInitArgs, JavaVMOption, JNI_ERR, JNI_EDETACHED, JNI_FALSE,
    JNI_OK,
};
use jvmhost_runtime::{os, JvmLibrary};

pub const DEFAULT_OPTION: &str = "-Xfake-default";

struct Tables {
    invoke: JNIInvokeInterface_,
    native: JNINativeInterface_,
}

struct Pointers {
    vm: JavaVM,
    env: JNIEnv,
}

// SAFETY: the tables are immutable after construction.
unsafe impl Send for Tables {}
unsafe impl Sync for Tables {}
unsafe impl Send for Pointers {}
unsafe impl Sync for Pointers {}

static TABLES: OnceLock<Tables> = OnceLock::new();
static POINTERS: OnceLock<Pointers> = OnceLock::new();
static SYSTEM_CLASS_MARKER: u8 = 0;
static EXIT_METHOD_MARKER: u8 = 0;

#[derive(Default)]
struct State {
    attached: Cell<bool>,
    created: Cell<bool>,
    create_result: Cell<jint>,
    create_without_vm: Cell<bool>,
    destroy_result: Cell<jint>,
    destroy_count: Cell<usize>,
    global_refs: Cell<isize>,
    dumps: Cell<usize>,
    exit_code: Cell<Option<jint>>,
    options: RefCell<Vec<(String, bool)>>,
}

thread_local! {
    static STATE: State = State::default();
    static DEFAULTS: JavaVMOption = JavaVMOption {
        option_string: c"-Xfake-default".as_ptr() as *mut c_char,
        extra_info: ptr::null_mut(),
    };
}

fn tables() -> &'static Tables {
    TABLES.get_or_init(|| Tables {
        invoke: JNIInvokeInterface_ {
            reserved: [ptr::null_mut(); 3],
            destroy_java_vm: Some(destroy_java_vm),
            attach_current_thread: Some(attach_current_thread),
            detach_current_thread: Some(detach_current_thread),
            get_env: Some(get_env),
            attach_current_thread_as_daemon: Some(attach_current_thread),
        },
        native: JNINativeInterface_ {
            reserved: [ptr::null_mut(); 4],
            get_version: None,
            _define_class: ptr::null_mut(),
            find_class: Some(find_class),
            _slots_7_15: [ptr::null_mut(); 9],
            exception_describe: Some(exception_noop),
            exception_clear: Some(exception_noop),
            _slots_18_20: [ptr::null_mut(); 3],
            new_global_ref: Some(new_global_ref),
            delete_global_ref: Some(delete_global_ref),
            delete_local_ref: Some(delete_local_ref),
            _slots_24_112: [ptr::null_mut(); 89],
            get_static_method_id: Some(get_static_method_id),
            _slots_114_142: [ptr::null_mut(); 29],
            call_static_void_method_a: Some(call_static_void_method_a),
            _slots_144_227: [ptr::null_mut(); 84],
            exception_check: Some(exception_check),
        },
    })
}

fn pointers() -> &'static Pointers {
    POINTERS.get_or_init(|| {
        let tables = tables();
        Pointers {
            vm: &tables.invoke,
            env: &tables.native,
        }
    })
}

pub fn vm_ptr() -> *mut JavaVM {
    &pointers().vm as *const JavaVM as *mut JavaVM
}

pub fn env_ptr() -> *mut JNIEnv {
    &pointers().env as *const JNIEnv as *mut JNIEnv
}

fn marker(byte: &'static u8) -> *mut c_void {
    byte as *const u8 as *mut c_void
}

unsafe extern "system" fn get_default_init_args(args: *mut c_void) -> jint {
    let args = args.cast::<JavaVMInitArgs>();
    DEFAULTS.with(|option| {
        (*args).n_options = 1;
        (*args).options = option as *const JavaVMOption as *mut JavaVMOption;
    });
    JNI_OK
}

unsafe extern "system" fn create_java_vm(
    pvm: *mut *mut JavaVM,
    penv: *mut *mut c_void,
    args: *mut c_void,
) -> jint {
    let args = &*args.cast::<JavaVMInitArgs>();
    let recorded = (0..args.n_options as usize)
        .map(|i| {
            let option = &*args.options.add(i);
            (
                CStr::from_ptr(option.option_string)
                    .to_string_lossy()
                    .into_owned(),
                !option.extra_info.is_null(),
            )
        })
        .collect();

    STATE.with(|state| {
        *state.options.borrow_mut() = recorded;
        let rc = state.create_result.get();
        if rc == JNI_OK && !state.create_without_vm.get() {
            *pvm = vm_ptr();
            *penv = env_ptr().cast();
            state.created.set(true);
            state.attached.set(true);
        }
        rc
    })
}

unsafe extern "system" fn get_created_java_vms(
    buf: *mut *mut JavaVM,
    len: jsize,
    count: *mut jsize,
) -> jint {
    let created = STATE.with(|state| state.created.get());
    *count = jsize::from(created);
    if created && len > 0 {
        *buf = vm_ptr();
    }
    JNI_OK
}

unsafe extern "system" fn dump_all_stacks(_env: *mut JNIEnv, _unused: jclass) {
    STATE.with(|state| state.dumps.set(state.dumps.get() + 1));
}

unsafe extern "system" fn destroy_java_vm(_vm: *mut JavaVM) -> jint {
    STATE.with(|state| {
        state.destroy_count.set(state.destroy_count.get() + 1);
        state.created.set(false);
        state.attached.set(false);
        state.destroy_result.get()
    })
}

unsafe extern "system" fn attach_current_thread(
    _vm: *mut JavaVM,
    penv: *mut *mut c_void,
    _args: *mut c_void,
) -> jint {
    STATE.with(|state| state.attached.set(true));
    *penv = env_ptr().cast();
    JNI_OK
}

unsafe extern "system" fn detach_current_thread(_vm: *mut JavaVM) -> jint {
    STATE.with(|state| {
        if state.attached.replace(false) {
            JNI_OK
        } else {
            JNI_ERR
        }
    })
}

unsafe extern "system" fn get_env(_vm: *mut JavaVM, penv: *mut *mut c_void, _version: jint) -> jint {
    if STATE.with(|state| state.attached.get()) {
        *penv = env_ptr().cast();
        JNI_OK
    } else {
        *penv = ptr::null_mut();
        JNI_EDETACHED
    }
}

unsafe extern "system" fn find_class(_env: *mut JNIEnv, name: *const c_char) -> jclass {
    if CStr::from_ptr(name) == c"java/lang/System" {
        marker(&SYSTEM_CLASS_MARKER)
    } else {
        ptr::null_mut()
    }
}

unsafe extern "system" fn exception_noop(_env: *mut JNIEnv) {}

unsafe extern "system" fn exception_check(_env: *mut JNIEnv) -> jboolean {
    JNI_FALSE
}

unsafe extern "system" fn new_global_ref(_env: *mut JNIEnv, obj: jobject) -> jobject {
    STATE.with(|state| state.global_refs.set(state.global_refs.get() + 1));
    obj
}

unsafe extern "system" fn delete_global_ref(_env: *mut JNIEnv, _obj: jobject) {
    STATE.with(|state| state.global_refs.set(state.global_refs.get() - 1));
}

unsafe extern "system" fn delete_local_ref(_env: *mut JNIEnv, _obj: jobject) {}

unsafe extern "system" fn get_static_method_id(
    _env: *mut JNIEnv,
    _class: jclass,
    name: *const c_char,
    signature: *const c_char,
) -> jmethodID {
    if CStr::from_ptr(name) == c"exit" && CStr::from_ptr(signature) == c"(I)V" {
        marker(&EXIT_METHOD_MARKER)
    } else {
        ptr::null_mut()
    }
}

unsafe extern "system" fn call_static_void_method_a(
    _env: *mut JNIEnv,
    _class: jclass,
    _method: jmethodID,
    args: *const jvalue,
) {
    let code = (*args).i;
    STATE.with(|state| state.exit_code.set(Some(code)));
}

/// Entry points of the fake runtime.
pub fn entry_points() -> EntryPoints {
    EntryPoints {
        get_default_init_args: Some(get_default_init_args),
        create_java_vm: Some(create_java_vm),
        get_created_java_vms: Some(get_created_java_vms),
        dump_all_stacks: Some(dump_all_stacks),
    }
}

/// A binding over the fake runtime.
pub fn library() -> Arc<JvmLibrary> {
    Arc::new(JvmLibrary::with_entry_points(os::create(), entry_points()))
}

pub fn set_create_result(code: jint) {
    STATE.with(|state| state.create_result.set(code));
}

/// Make create report success without handing back a runtime.
pub fn set_create_without_vm(enabled: bool) {
    STATE.with(|state| state.create_without_vm.set(enabled));
}

pub fn set_destroy_result(code: jint) {
    STATE.with(|state| state.destroy_result.set(code));
}

/// Option strings passed to the last create call.
pub fn recorded_options() -> Vec<String> {
    STATE.with(|state| state.options.borrow().iter().map(|(o, _)| o.clone()).collect())
}

/// Whether each recorded option carried an extra-info pointer.
pub fn recorded_extra_info() -> Vec<bool> {
    STATE.with(|state| state.options.borrow().iter().map(|(_, e)| *e).collect())
}

pub fn destroy_count() -> usize {
    STATE.with(|state| state.destroy_count.get())
}

pub fn global_refs() -> isize {
    STATE.with(|state| state.global_refs.get())
}

pub fn dumps() -> usize {
    STATE.with(|state| state.dumps.get())
}

pub fn exit_code() -> Option<jint> {
    STATE.with(|state| state.exit_code.get())
}

pub fn is_attached() -> bool {
    STATE.with(|state| state.attached.get())
}
