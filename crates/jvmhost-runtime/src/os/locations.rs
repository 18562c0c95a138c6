//! Per-platform runtime installation layouts.
//!
//! Each layout is plain data: the bare library names the platform loader
//! resolves through its own search path, and an ordered list of candidate
//! locations relative to a runtime home. Templates start with [`HOME_TOKEN`]
//! and may contain [`CPU_TOKEN`].

use std::path::{Path, PathBuf};

/// Environment variable naming the runtime home directory.
pub const HOME_ENV: &str = "JAVA_HOME";

/// Placeholder for the runtime home in a template.
pub const HOME_TOKEN: &str = "$JAVA_HOME";

/// Placeholder for the runtime's architecture directory in a template.
pub const CPU_TOKEN: &str = "$CPU";

/// Installation layout of the runtime on one platform family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformLayout {
    pub name: &'static str,
    /// Bare runtime library name.
    pub runtime_library: &'static str,
    /// Bare signal-chaining library name.
    pub signal_library: &'static str,
    /// Candidate runtime library locations, probed in order.
    pub home_templates: &'static [&'static str],
}

pub const LINUX: PlatformLayout = PlatformLayout {
    name: "linux",
    runtime_library: "libjvm.so",
    signal_library: "libjsig.so",
    home_templates: &[
        "$JAVA_HOME/lib/server/libjvm.so",
        "$JAVA_HOME/jre/lib/$CPU/server/libjvm.so",
        "$JAVA_HOME/jre/lib/server/libjvm.so",
        "$JAVA_HOME/lib/$CPU/server/libjvm.so",
        "$JAVA_HOME/lib/client/libjvm.so",
        "$JAVA_HOME/jre/lib/$CPU/client/libjvm.so",
        "$JAVA_HOME/lib/$CPU/client/libjvm.so",
        "$JAVA_HOME/lib/j9vm/libjvm.so",
        "$JAVA_HOME/jre/lib/$CPU/j9vm/libjvm.so",
        "$JAVA_HOME/jre/lib/$CPU/classic/libjvm.so",
        "$JAVA_HOME/lib/$CPU/classic/libjvm.so",
    ],
};

pub const MACOS: PlatformLayout = PlatformLayout {
    name: "macos",
    runtime_library: "libjvm.dylib",
    signal_library: "libjsig.dylib",
    home_templates: &[
        "$JAVA_HOME/lib/server/libjvm.dylib",
        "$JAVA_HOME/jre/lib/server/libjvm.dylib",
        "$JAVA_HOME/lib/client/libjvm.dylib",
        "$JAVA_HOME/../Libraries/libjvm.dylib",
    ],
};

pub const WINDOWS: PlatformLayout = PlatformLayout {
    name: "windows",
    runtime_library: "jvm.dll",
    signal_library: "jsig.dll",
    home_templates: &[
        "$JAVA_HOME\\bin\\server\\jvm.dll",
        "$JAVA_HOME\\jre\\bin\\server\\jvm.dll",
        "$JAVA_HOME\\bin\\client\\jvm.dll",
        "$JAVA_HOME\\jre\\bin\\client\\jvm.dll",
    ],
};

/// Layout of the platform this crate was built for.
pub fn current() -> &'static PlatformLayout {
    if cfg!(windows) {
        &WINDOWS
    } else if cfg!(target_os = "macos") {
        &MACOS
    } else {
        &LINUX
    }
}

/// Architecture directory name used inside runtime installations.
pub fn jdk_cpu_dir() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "x86" => "i386",
        "powerpc" => "ppc",
        "powerpc64" => "ppc64",
        "sparc64" => "sparcv9",
        other => other,
    }
}

impl PlatformLayout {
    /// Expand one template against `home`.
    ///
    /// Templates without a leading [`HOME_TOKEN`] are taken as-is.
    pub fn expand(&self, template: &str, home: &Path) -> PathBuf {
        let template = template.replace(CPU_TOKEN, jdk_cpu_dir());
        match template.strip_prefix(HOME_TOKEN) {
            Some(rest) => {
                let rest = rest.trim_start_matches(['/', '\\']);
                home.join(rest)
            }
            None => PathBuf::from(template),
        }
    }

    /// Every candidate location under `home`, in probe order.
    pub fn candidates(&self, home: &Path) -> Vec<PathBuf> {
        self.home_templates
            .iter()
            .map(|template| self.expand(template, home))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_templates_are_home_relative() {
        for layout in [&LINUX, &MACOS, &WINDOWS] {
            assert!(!layout.home_templates.is_empty());
            for template in layout.home_templates {
                assert!(template.starts_with(HOME_TOKEN), "{template}");
                assert!(template.ends_with(layout.runtime_library), "{template}");
            }
        }
    }

    #[test]
    fn test_expand_substitutes_tokens() {
        let home = Path::new("/usr/lib/jvm/java-8");
        let path = LINUX.expand("$JAVA_HOME/jre/lib/$CPU/server/libjvm.so", home);
        let expected = home
            .join("jre/lib")
            .join(jdk_cpu_dir())
            .join("server/libjvm.so");
        assert_eq!(path, expected);
        assert!(!path.to_string_lossy().contains('$'));
    }

    #[test]
    fn test_expand_without_token() {
        let path = LINUX.expand("/opt/rt/libjvm.so", Path::new("/ignored"));
        assert_eq!(path, PathBuf::from("/opt/rt/libjvm.so"));
    }

    #[test]
    fn test_candidates_follow_template_order() {
        let home = Path::new("/jdk");
        let candidates = LINUX.candidates(home);
        assert_eq!(candidates.len(), LINUX.home_templates.len());
        assert_eq!(candidates[0], home.join("lib/server/libjvm.so"));
    }

    #[test]
    fn test_cpu_dir_mapping() {
        let cpu = jdk_cpu_dir();
        assert!(!cpu.is_empty());
        if cfg!(target_arch = "x86_64") {
            assert_eq!(cpu, "amd64");
        }
    }
}
