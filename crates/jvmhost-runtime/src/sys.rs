//! Invocation-interface ABI of the embedded Java runtime.
//!
//! Only the slots this crate calls are named. The rest of each function
//! table is kept as opaque padding so the named slots sit at the offsets
//! the runtime publishes. Function-table pointers are read-only from the
//! host side; the runtime owns them.

#![allow(non_camel_case_types)]

use std::ffi::{c_char, c_void};

pub type jint = i32;
pub type jlong = i64;
pub type jsize = jint;
pub type jboolean = u8;
pub type jbyte = i8;
pub type jchar = u16;
pub type jshort = i16;
pub type jfloat = f32;
pub type jdouble = f64;

pub type jobject = *mut c_void;
pub type jclass = jobject;
pub type jmethodID = *mut c_void;

pub const JNI_FALSE: jboolean = 0;
pub const JNI_TRUE: jboolean = 1;

pub const JNI_OK: jint = 0;
pub const JNI_ERR: jint = -1;
pub const JNI_EDETACHED: jint = -2;
pub const JNI_EVERSION: jint = -3;
pub const JNI_ENOMEM: jint = -4;
pub const JNI_EEXIST: jint = -5;
pub const JNI_EINVAL: jint = -6;

pub const JNI_VERSION_1_2: jint = 0x0001_0002;
pub const JNI_VERSION_1_8: jint = 0x0001_0008;

/// A runtime instance: a pointer to its invocation function table.
pub type JavaVM = *const JNIInvokeInterface_;

/// A per-thread execution context: a pointer to its native function table.
pub type JNIEnv = *const JNINativeInterface_;

#[repr(C)]
#[derive(Clone, Copy)]
pub union jvalue {
    pub z: jboolean,
    pub b: jbyte,
    pub c: jchar,
    pub s: jshort,
    pub i: jint,
    pub j: jlong,
    pub f: jfloat,
    pub d: jdouble,
    pub l: jobject,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct JavaVMOption {
    pub option_string: *mut c_char,
    pub extra_info: *mut c_void,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct JavaVMInitArgs {
    pub version: jint,
    pub n_options: jint,
    pub options: *mut JavaVMOption,
    pub ignore_unrecognized: jboolean,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct JavaVMAttachArgs {
    pub version: jint,
    pub name: *mut c_char,
    pub group: jobject,
}

/// Invocation interface, slots 0..=7.
#[repr(C)]
pub struct JNIInvokeInterface_ {
    pub reserved: [*mut c_void; 3],
    pub destroy_java_vm: Option<unsafe extern "system" fn(vm: *mut JavaVM) -> jint>,
    pub attach_current_thread: Option<
        unsafe extern "system" fn(vm: *mut JavaVM, penv: *mut *mut c_void, args: *mut c_void) -> jint,
    >,
    pub detach_current_thread: Option<unsafe extern "system" fn(vm: *mut JavaVM) -> jint>,
    pub get_env: Option<
        unsafe extern "system" fn(vm: *mut JavaVM, penv: *mut *mut c_void, version: jint) -> jint,
    >,
    pub attach_current_thread_as_daemon: Option<
        unsafe extern "system" fn(vm: *mut JavaVM, penv: *mut *mut c_void, args: *mut c_void) -> jint,
    >,
}

/// Native interface prefix, slots 0..=228.
#[repr(C)]
pub struct JNINativeInterface_ {
    pub reserved: [*mut c_void; 4],
    /// 4
    pub get_version: Option<unsafe extern "system" fn(env: *mut JNIEnv) -> jint>,
    pub _define_class: *mut c_void,
    /// 6
    pub find_class:
        Option<unsafe extern "system" fn(env: *mut JNIEnv, name: *const c_char) -> jclass>,
    pub _slots_7_15: [*mut c_void; 9],
    /// 16
    pub exception_describe: Option<unsafe extern "system" fn(env: *mut JNIEnv)>,
    /// 17
    pub exception_clear: Option<unsafe extern "system" fn(env: *mut JNIEnv)>,
    pub _slots_18_20: [*mut c_void; 3],
    /// 21
    pub new_global_ref: Option<unsafe extern "system" fn(env: *mut JNIEnv, obj: jobject) -> jobject>,
    /// 22
    pub delete_global_ref: Option<unsafe extern "system" fn(env: *mut JNIEnv, obj: jobject)>,
    /// 23
    pub delete_local_ref: Option<unsafe extern "system" fn(env: *mut JNIEnv, obj: jobject)>,
    pub _slots_24_112: [*mut c_void; 89],
    /// 113
    pub get_static_method_id: Option<
        unsafe extern "system" fn(
            env: *mut JNIEnv,
            class: jclass,
            name: *const c_char,
            signature: *const c_char,
        ) -> jmethodID,
    >,
    pub _slots_114_142: [*mut c_void; 29],
    /// 143
    pub call_static_void_method_a: Option<
        unsafe extern "system" fn(
            env: *mut JNIEnv,
            class: jclass,
            method: jmethodID,
            args: *const jvalue,
        ),
    >,
    pub _slots_144_227: [*mut c_void; 84],
    /// 228
    pub exception_check: Option<unsafe extern "system" fn(env: *mut JNIEnv) -> jboolean>,
}

pub type GetDefaultJavaVMInitArgsFn = unsafe extern "system" fn(args: *mut c_void) -> jint;
pub type CreateJavaVMFn =
    unsafe extern "system" fn(pvm: *mut *mut JavaVM, penv: *mut *mut c_void, args: *mut c_void) -> jint;
pub type GetCreatedJavaVMsFn =
    unsafe extern "system" fn(buf: *mut *mut JavaVM, len: jsize, count: *mut jsize) -> jint;
pub type DumpAllStacksFn = unsafe extern "system" fn(env: *mut JNIEnv, unused: jclass);

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{offset_of, size_of};

    const SLOT: usize = size_of::<*mut c_void>();

    #[test]
    fn test_invoke_interface_slots() {
        assert_eq!(offset_of!(JNIInvokeInterface_, destroy_java_vm), 3 * SLOT);
        assert_eq!(offset_of!(JNIInvokeInterface_, get_env), 6 * SLOT);
        assert_eq!(size_of::<JNIInvokeInterface_>(), 8 * SLOT);
    }

    #[test]
    fn test_native_interface_slots() {
        assert_eq!(offset_of!(JNINativeInterface_, find_class), 6 * SLOT);
        assert_eq!(offset_of!(JNINativeInterface_, exception_clear), 17 * SLOT);
        assert_eq!(offset_of!(JNINativeInterface_, new_global_ref), 21 * SLOT);
        assert_eq!(offset_of!(JNINativeInterface_, get_static_method_id), 113 * SLOT);
        assert_eq!(offset_of!(JNINativeInterface_, call_static_void_method_a), 143 * SLOT);
        assert_eq!(offset_of!(JNINativeInterface_, exception_check), 228 * SLOT);
    }
}
