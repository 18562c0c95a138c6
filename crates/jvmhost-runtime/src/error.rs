//! Error types for the embedded runtime host.

use std::path::PathBuf;
use thiserror::Error;

use crate::sys::{JNI_EINVAL, JNI_ENOMEM, JNI_ERR};

/// Errors that can occur while locating, loading or driving the runtime.
#[derive(Error, Debug)]
pub enum HostError {
    /// The native loader rejected a shared library.
    #[error("Failed to load {}: {message} (code {code})", path.display())]
    LibraryLoad {
        path: PathBuf,
        code: i32,
        message: String,
    },

    /// A required entry point was not resolved from the runtime library.
    #[error("Entry point not resolved: {0}")]
    SymbolMissing(&'static str),

    /// The system allocator could not satisfy an arena request.
    #[error("Out of memory allocating {size} bytes")]
    OutOfMemory { size: usize },

    /// A string handed to the runtime contained an interior NUL byte.
    #[error("Invalid string: {0}")]
    InvalidString(#[from] std::ffi::NulError),

    /// The operation needs a running runtime instance.
    #[error("Runtime instance is not running")]
    NotRunning,

    /// The runtime refused to start; the code is the runtime's own.
    #[error("Runtime creation failed (code {code})")]
    CreateFailed { code: i32 },

    /// An invocation-interface call returned a non-zero code.
    #[error("{operation} failed (code {code})")]
    Jni { operation: &'static str, code: i32 },

    /// A class lookup returned null.
    #[error("Class not found: {0}")]
    ClassNotFound(String),

    /// A static method lookup returned null.
    #[error("Method not found: {class}.{name}{signature}")]
    MethodNotFound {
        class: String,
        name: String,
        signature: String,
    },

    /// Managed code left an exception pending.
    #[error("Java exception raised during {0}")]
    JavaException(&'static str),
}

impl HostError {
    /// Numeric result code for callers that speak return codes.
    ///
    /// Loader failures report the platform code, runtime failures report the
    /// runtime's code unchanged, and misuse reports `JNI_ERR`.
    pub fn code(&self) -> i32 {
        match self {
            HostError::LibraryLoad { code, .. } => *code,
            HostError::CreateFailed { code } => *code,
            HostError::Jni { code, .. } => *code,
            HostError::OutOfMemory { .. } => JNI_ENOMEM,
            HostError::InvalidString(_) => JNI_EINVAL,
            HostError::SymbolMissing(_)
            | HostError::NotRunning
            | HostError::ClassNotFound(_)
            | HostError::MethodNotFound { .. }
            | HostError::JavaException(_) => JNI_ERR,
        }
    }
}

/// Result type for host operations.
pub type HostResult<T> = std::result::Result<T, HostError>;
