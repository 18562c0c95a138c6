//! Runtime initialization options.
//!
//! [`OptionVector`] builds the ordered option list for one create call:
//! library defaults, caller options, the class path, the three host hooks
//! and the two process-identity properties. No de-duplication is done;
//! conflicting duplicates are left for the runtime to resolve.
//! [`OptionVector::materialize`] copies the list into a [`MemoryPool`] in the
//! layout the runtime expects.

use std::ffi::{c_char, c_int, c_void};
use std::marker::PhantomData;
use std::ptr;

use tracing::{error, trace};

use crate::arena::{pool_array, pool_strdup, MemoryPool};
use crate::error::HostResult;
use crate::sys::{jint, JavaVMInitArgs, JavaVMOption, JNI_TRUE};

/// Namespace of the process-identity system properties.
pub const PROCESS_PROPERTY_NAMESPACE: &str = "jvmhost.process";

/// System property carrying the class path.
pub const CLASSPATH_PROPERTY: &str = "java.class.path";

pub const EXIT_HOOK_OPTION: &str = "exit";
pub const ABORT_HOOK_OPTION: &str = "abort";
pub const VFPRINTF_HOOK_OPTION: &str = "vfprintf";

/// Process exit status used when the runtime aborts.
pub const ABORT_EXIT_CODE: i32 = 123;

#[cfg_attr(windows, link(name = "legacy_stdio_definitions"))]
extern "C" {
    // `va_list` is forwarded untouched; it is pointer-sized on every
    // supported ABI (an array decaying to a pointer, or a pointer to a
    // by-reference aggregate).
    #[link_name = "vfprintf"]
    fn c_vfprintf(stream: *mut c_void, format: *const c_char, args: *mut c_void) -> c_int;
}

extern "system" fn exit_hook(code: jint) {
    tracing::info!("Runtime requested process exit with status {}", code);
    std::process::exit(code);
}

extern "system" fn abort_hook() {
    error!("Runtime aborted");
    std::process::exit(ABORT_EXIT_CODE);
}

unsafe extern "system" fn vfprintf_hook(
    stream: *mut c_void,
    format: *const c_char,
    args: *mut c_void,
) -> jint {
    trace!("Forwarding runtime output");
    c_vfprintf(stream, format, args)
}

/// One option string plus its opaque extra-info pointer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitOption {
    pub option: String,
    pub extra_info: *mut c_void,
}

impl InitOption {
    pub fn new(option: impl Into<String>) -> Self {
        Self {
            option: option.into(),
            extra_info: ptr::null_mut(),
        }
    }

    pub fn with_extra_info(option: impl Into<String>, extra_info: *mut c_void) -> Self {
        Self {
            option: option.into(),
            extra_info,
        }
    }
}

/// The process-exit, abort and output-redirection hooks.
pub fn host_hooks() -> [InitOption; 3] {
    [
        InitOption::with_extra_info(EXIT_HOOK_OPTION, exit_hook as *mut c_void),
        InitOption::with_extra_info(ABORT_HOOK_OPTION, abort_hook as *mut c_void),
        InitOption::with_extra_info(VFPRINTF_HOOK_OPTION, vfprintf_hook as *mut c_void),
    ]
}

/// `-Djava.class.path=<classpath>`.
pub fn classpath_option(classpath: &str) -> InitOption {
    InitOption::new(format!("-D{CLASSPATH_PROPERTY}={classpath}"))
}

fn process_option(key: &str, value: i32) -> InitOption {
    InitOption::new(format!("-D{PROCESS_PROPERTY_NAMESPACE}.{key}={value}"))
}

/// Ordered options for a single create call.
#[derive(Debug, Clone, Default)]
pub struct OptionVector {
    options: Vec<InitOption>,
}

impl OptionVector {
    /// Assemble the options in their fixed order.
    pub fn build(
        defaults: Vec<InitOption>,
        custom: &[InitOption],
        classpath: Option<&str>,
        parent_pid: i32,
        pid: i32,
    ) -> Self {
        let mut options = defaults;
        options.extend_from_slice(custom);
        if let Some(classpath) = classpath {
            options.push(classpath_option(classpath));
        }
        options.extend(host_hooks());
        options.push(process_option("ppid", parent_pid));
        options.push(process_option("pid", pid));
        Self { options }
    }

    pub fn options(&self) -> &[InitOption] {
        &self.options
    }

    pub fn len(&self) -> usize {
        self.options.len()
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    /// Copy the options into `pool` as a `JavaVMInitArgs`.
    ///
    /// The returned arguments borrow the pool; every string and the option
    /// array live there until the pool releases them.
    pub fn materialize<'p>(
        &self,
        pool: &'p mut dyn MemoryPool,
        version: jint,
    ) -> HostResult<InitArgs<'p>> {
        let count = self.options.len();
        let array = pool_array::<JavaVMOption>(pool, count)?;

        for (index, option) in self.options.iter().enumerate() {
            let option_string = pool_strdup(pool, &option.option)?;
            // SAFETY: `array` has room for `count` entries and `index < count`.
            unsafe {
                array.as_ptr().add(index).write(JavaVMOption {
                    option_string,
                    extra_info: option.extra_info,
                });
            }
        }

        Ok(InitArgs {
            raw: JavaVMInitArgs {
                version,
                n_options: count as jint,
                options: array.as_ptr(),
                ignore_unrecognized: JNI_TRUE,
            },
            _pool: PhantomData,
        })
    }
}

/// Initialization arguments backed by a pool borrow.
#[derive(Debug)]
pub struct InitArgs<'p> {
    raw: JavaVMInitArgs,
    _pool: PhantomData<&'p mut ()>,
}

impl InitArgs<'_> {
    pub fn as_mut_ptr(&mut self) -> *mut JavaVMInitArgs {
        &mut self.raw
    }

    pub fn raw(&self) -> &JavaVMInitArgs {
        &self.raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::SimpleMemoryPool;
    use crate::sys::JNI_VERSION_1_8;
    use std::ffi::CStr;

    fn strings(vector: &OptionVector) -> Vec<&str> {
        vector.options().iter().map(|o| o.option.as_str()).collect()
    }

    #[test]
    fn test_fixed_order() {
        let defaults = vec![InitOption::new("-Xdefault")];
        let custom = [InitOption::new("-Xmx64m"), InitOption::new("-Dfoo=bar")];
        let vector = OptionVector::build(defaults, &custom, Some("/a.jar"), 10, 20);

        assert_eq!(
            strings(&vector),
            vec![
                "-Xdefault",
                "-Xmx64m",
                "-Dfoo=bar",
                "-Djava.class.path=/a.jar",
                "exit",
                "abort",
                "vfprintf",
                "-Djvmhost.process.ppid=10",
                "-Djvmhost.process.pid=20",
            ]
        );
    }

    #[test]
    fn test_minimal_vector() {
        let vector = OptionVector::build(Vec::new(), &[], None, 1, 2);
        assert_eq!(vector.len(), 5);
        assert!(!strings(&vector).iter().any(|s| s.contains(CLASSPATH_PROPERTY)));
    }

    #[test]
    fn test_duplicates_are_kept() {
        let custom = [InitOption::new("-Xmx64m"), InitOption::new("-Xmx128m")];
        let vector = OptionVector::build(vec![InitOption::new("-Xmx64m")], &custom, None, 1, 2);
        let count = strings(&vector).iter().filter(|s| s.starts_with("-Xmx")).count();
        assert_eq!(count, 3);
    }

    #[test]
    fn test_hooks_carry_function_pointers() {
        for hook in host_hooks() {
            assert!(!hook.extra_info.is_null(), "{}", hook.option);
        }
    }

    #[test]
    fn test_materialize_into_pool() {
        let mut pool = SimpleMemoryPool::new();
        let vector = OptionVector::build(Vec::new(), &[], Some("/a.jar"), 3, 4);

        let copied: Vec<(String, bool)> = {
            let args = vector.materialize(&mut pool, JNI_VERSION_1_8).unwrap();
            let raw = args.raw();
            assert_eq!(raw.version, JNI_VERSION_1_8);
            assert_eq!(raw.n_options as usize, vector.len());
            assert_eq!(raw.ignore_unrecognized, JNI_TRUE);

            (0..raw.n_options as usize)
                .map(|i| unsafe {
                    let option = &*raw.options.add(i);
                    (
                        CStr::from_ptr(option.option_string)
                            .to_string_lossy()
                            .into_owned(),
                        option.extra_info.is_null(),
                    )
                })
                .collect()
        };

        assert_eq!(copied[0], ("-Djava.class.path=/a.jar".to_string(), true));
        assert_eq!(copied[1], ("exit".to_string(), false));
        assert_eq!(copied[5], ("-Djvmhost.process.pid=4".to_string(), true));
        // One array plus one buffer per string.
        assert_eq!(pool.len(), vector.len() + 1);
    }
}
