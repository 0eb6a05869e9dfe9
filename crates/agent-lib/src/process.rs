//! Process inspection through procfs
//!
//! Reads command lines, environment blocks and names of processes and
//! decides which of them are JVMs. All readers take the proc root as a
//! parameter so they can be pointed at a mock tree.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Executables that are always JVM launchers
const JVM_RUNTIMES: &[&str] = &[
    "java",
    "openjdk",
    "javac",
    "scala",
    "kotlin",
    "kotlinc",
    "groovy",
    "clojure",
    "jruby",
    "jython",
    "graalvm",
    "native-image",
    "gu",
    "polyglot",
    "native-image-configure",
];

/// Launchers commonly installed with a version suffix (`java17`, `openjdk-11`)
const VERSIONED_RUNTIMES: &[&str] = &["java", "openjdk", "graalvm"];

/// Command line fragments only a JVM is expected to carry
const JVM_INDICATORS: &[&str] = &[
    "-classpath ",
    "-jar ",
    "-Xmx",
    "-Xms",
    "-XX:",
    "-javaagent:",
    "-Xbootclasspath",
    "-Xrunjdwp:",
    "com.sun.",
    "java.lang.",
    "scala.tools.",
    "kotlin.compiler",
    "groovy.lang.",
    "clojure.main",
    "org.jruby.",
    "org.python.",
    "org.springframework.",
    "org.junit.",
    "org.gradle.",
    "org.maven.",
];

/// Supplies the environment of a process
pub trait EnvironmentSource: Send + Sync {
    /// Environment of `pid`; empty when it cannot be read
    fn environment(&self, pid: u32) -> HashMap<String, String>;
}

/// Reads `/proc/<pid>/environ`
#[derive(Debug, Clone)]
pub struct ProcEnvironment {
    proc_root: PathBuf,
}

impl ProcEnvironment {
    pub fn new(proc_root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
        }
    }
}

impl EnvironmentSource for ProcEnvironment {
    fn environment(&self, pid: u32) -> HashMap<String, String> {
        read_environ(&self.proc_root, pid)
    }
}

/// A fixed snapshot, used for offline resolution
impl EnvironmentSource for HashMap<String, String> {
    fn environment(&self, _pid: u32) -> HashMap<String, String> {
        self.clone()
    }
}

/// Read and parse the environment block of a process
pub fn read_environ(proc_root: &Path, pid: u32) -> HashMap<String, String> {
    fs::read(proc_root.join(pid.to_string()).join("environ"))
        .map(|bytes| parse_environ(&bytes))
        .unwrap_or_default()
}

/// Parse NUL-delimited `KEY=VALUE` records. Records without `=` or with an
/// empty key are dropped; a later duplicate key replaces an earlier one.
pub fn parse_environ(bytes: &[u8]) -> HashMap<String, String> {
    bytes
        .split(|b| *b == 0)
        .filter_map(|record| {
            let record = String::from_utf8_lossy(record);
            let (key, value) = record.split_once('=')?;
            (!key.is_empty()).then(|| (key.to_string(), value.to_string()))
        })
        .collect()
}

/// Raw `/proc/<pid>/cmdline`, `None` when unreadable or empty (kernel threads)
pub fn read_cmdline(proc_root: &Path, pid: u32) -> Option<Vec<u8>> {
    fs::read(proc_root.join(pid.to_string()).join("cmdline"))
        .ok()
        .filter(|bytes| !bytes.is_empty())
}

/// Join argv with spaces
pub fn cmdline_to_string(cmdline: &[u8]) -> String {
    let trimmed = cmdline.strip_suffix(&[0]).unwrap_or(cmdline);
    String::from_utf8_lossy(trimmed).replace('\0', " ")
}

/// Process name from `/proc/<pid>/comm`
pub fn read_comm(proc_root: &Path, pid: u32) -> Option<String> {
    fs::read_to_string(proc_root.join(pid.to_string()).join("comm"))
        .ok()
        .map(|s| s.trim().to_string())
}

/// Numeric entries of the proc root, ascending
pub fn list_pids(proc_root: &Path) -> std::io::Result<Vec<u32>> {
    let mut pids: Vec<u32> = fs::read_dir(proc_root)?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().to_str()?.parse().ok())
        .collect();
    pids.sort_unstable();
    Ok(pids)
}

/// Decide whether a raw, NUL-separated command line belongs to a JVM
pub fn is_jvm(cmdline: &[u8]) -> bool {
    let Some(end) = cmdline.iter().position(|b| *b == 0) else {
        return false;
    };

    let executable = String::from_utf8_lossy(&cmdline[..end]);
    let name = executable.rsplit('/').next().unwrap_or_default();

    if JVM_RUNTIMES.contains(&name) {
        return true;
    }

    let versioned = VERSIONED_RUNTIMES.iter().any(|runtime| {
        name.strip_prefix(runtime)
            .is_some_and(is_version_suffix)
    });
    if versioned {
        return true;
    }

    let joined = cmdline_to_string(cmdline);
    JVM_INDICATORS.iter().any(|indicator| joined.contains(indicator))
}

/// A JVM can only write a usable perf map when frame pointers are kept
pub fn is_perfmap_dump_supported(cmdline: &[u8]) -> bool {
    cmdline
        .windows(b"-XX:+PreserveFramePointer".len())
        .any(|w| w == b"-XX:+PreserveFramePointer")
}

/// Optional `-`, `_` or `.` then up to three digits
fn is_version_suffix(suffix: &str) -> bool {
    let digits = suffix
        .strip_prefix(['-', '_', '.'])
        .unwrap_or(suffix);
    digits.len() <= 3 && digits.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_proc_file(root: &Path, pid: u32, name: &str, content: &[u8]) {
        let dir = root.join(pid.to_string());
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(name), content).unwrap();
    }

    #[test]
    fn test_parse_environ() {
        let env = parse_environ(
            b"PATH=/usr/bin:/bin\0HOME=/home/user\0JAVA_TOOL_OPTIONS=-Xmx2g -XX:+UseG1GC\0_JAVA_OPTIONS=-Xms512m\0EMPTY_VAR=\0",
        );
        assert_eq!(env.len(), 5);
        assert_eq!(env["JAVA_TOOL_OPTIONS"], "-Xmx2g -XX:+UseG1GC");
        assert_eq!(env["_JAVA_OPTIONS"], "-Xms512m");
        assert_eq!(env["EMPTY_VAR"], "");
    }

    #[test]
    fn test_parse_environ_drops_malformed_records() {
        let env = parse_environ(b"NOEQUALS\0=value\0A=b=c\0\0");
        assert_eq!(env.len(), 1);
        assert_eq!(env["A"], "b=c");
    }

    #[test]
    fn test_read_environ_missing_is_empty() {
        let dir = TempDir::new().unwrap();
        assert!(read_environ(dir.path(), 1).is_empty());

        write_proc_file(dir.path(), 1, "environ", b"JDK_JAVA_OPTIONS=-Xmx1g\0");
        let env = ProcEnvironment::new(dir.path()).environment(1);
        assert_eq!(env["JDK_JAVA_OPTIONS"], "-Xmx1g");
    }

    #[test]
    fn test_read_cmdline_and_comm() {
        let dir = TempDir::new().unwrap();
        write_proc_file(dir.path(), 42, "cmdline", b"java\0-Xmx1g\0MyApp\0");
        write_proc_file(dir.path(), 42, "comm", b"java\n");
        write_proc_file(dir.path(), 2, "cmdline", b"");

        let cmdline = read_cmdline(dir.path(), 42).unwrap();
        assert_eq!(cmdline_to_string(&cmdline), "java -Xmx1g MyApp");
        assert_eq!(read_comm(dir.path(), 42).as_deref(), Some("java"));
        assert!(read_cmdline(dir.path(), 2).is_none());
        assert!(read_cmdline(dir.path(), 3).is_none());
    }

    #[test]
    fn test_list_pids() {
        let dir = TempDir::new().unwrap();
        for name in ["10", "2", "self", "sys"] {
            fs::create_dir_all(dir.path().join(name)).unwrap();
        }
        assert_eq!(list_pids(dir.path()).unwrap(), vec![2, 10]);
    }

    #[test]
    fn test_is_jvm_by_executable() {
        assert!(is_jvm(b"/usr/bin/java\0-version\0"));
        assert!(is_jvm(b"/opt/jdk/bin/java17\0App\0"));
        assert!(is_jvm(b"openjdk-11\0App\0"));
        assert!(is_jvm(b"graalvm_21\0App\0"));
        assert!(is_jvm(b"kotlinc\0Main.kt\0"));
        assert!(!is_jvm(b"javascript\0app.js\0"));
        assert!(!is_jvm(b"java1234\0App\0"));
    }

    #[test]
    fn test_is_jvm_by_indicator() {
        assert!(is_jvm(b"/opt/app/launcher\0-Xmx512m\0Main\0"));
        assert!(is_jvm(b"/bin/sh\0-c\0exec -jar app.jar\0"));
        assert!(!is_jvm(b"/usr/bin/python3\0server.py\0"));
    }

    #[test]
    fn test_is_jvm_requires_nul() {
        assert!(!is_jvm(b"java -Xmx1g"));
        assert!(!is_jvm(b""));
    }

    #[test]
    fn test_perfmap_support() {
        assert!(is_perfmap_dump_supported(b"java\0-XX:+PreserveFramePointer\0App\0"));
        assert!(!is_perfmap_dump_supported(b"java\0App\0"));
    }
}
