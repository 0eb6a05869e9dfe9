//! HotSpot dynamic attach over a Unix domain socket
//!
//! The JVM only opens its attach listener after it sees a `.attach_pid<pid>`
//! trigger file and receives `SIGQUIT`. Pids and paths are translated into
//! the target's mount and pid namespace through `/proc/<pid>/root` and the
//! `NSpid` line of `/proc/<pid>/status`, so containerized JVMs work from the
//! host.
//!
//! `SIGQUIT` terminates any process that does not handle it, so the signal
//! is only sent once the target has `libjvm.so` mapped and a `SIGQUIT`
//! handler installed.

use super::{AttachError, AttachHandle, AttachTransport, CommandError};
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::fs;
use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

const PROTOCOL_VERSION: &str = "1";
const SOCKET_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Attaches to HotSpot-compatible JVMs (HotSpot, GraalVM, OpenJ9 in
/// compatibility mode)
#[derive(Debug, Clone)]
pub struct HotSpotAttachTransport {
    proc_root: PathBuf,
    timeout: Duration,
}

impl HotSpotAttachTransport {
    pub fn new(proc_root: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            proc_root: proc_root.into(),
            timeout,
        }
    }

    fn process_dir(&self, pid: u32) -> PathBuf {
        self.proc_root.join(pid.to_string())
    }

    fn socket_path(&self, pid: u32, nspid: u32) -> PathBuf {
        self.process_dir(pid)
            .join("root/tmp")
            .join(format!(".java_pid{}", nspid))
    }

    /// Refuse targets that the attach signal would kill
    fn ensure_signal_safe(&self, pid: u32, status: &str) -> Result<(), AttachError> {
        let maps = fs::read_to_string(self.process_dir(pid).join("maps")).map_err(|e| {
            AttachError::NotAJvm {
                pid,
                reason: format!("cannot read memory maps: {}", e),
            }
        })?;
        if !maps_libjvm(&maps) {
            return Err(AttachError::NotAJvm {
                pid,
                reason: "libjvm.so is not mapped".to_string(),
            });
        }
        if !sigquit_caught(status) {
            return Err(AttachError::NotAJvm {
                pid,
                reason: "no SIGQUIT handler installed yet".to_string(),
            });
        }
        Ok(())
    }

    /// Create the trigger file, signal the JVM and wait for its socket
    fn start_listener(&self, pid: u32, nspid: u32, socket: &Path) -> Result<(), AttachError> {
        let trigger = self.create_trigger_file(pid, nspid)?;
        let signalled = signal_quit(pid);

        let result = signalled.and_then(|_| {
            let deadline = Instant::now() + self.timeout;
            while !socket.exists() {
                if Instant::now() >= deadline {
                    return Err(AttachError::Timeout {
                        pid,
                        timeout_ms: self.timeout.as_millis() as u64,
                    });
                }
                thread::sleep(SOCKET_POLL_INTERVAL);
            }
            Ok(())
        });

        let _ = fs::remove_file(&trigger);
        result
    }

    /// The JVM looks in its working directory first, then in its tmp dir
    fn create_trigger_file(&self, pid: u32, nspid: u32) -> Result<PathBuf, AttachError> {
        let name = format!(".attach_pid{}", nspid);
        let cwd_trigger = self.process_dir(pid).join("cwd").join(&name);

        if fs::File::create(&cwd_trigger).is_ok() {
            return Ok(cwd_trigger);
        }

        let tmp_trigger = self.process_dir(pid).join("root/tmp").join(&name);
        fs::File::create(&tmp_trigger).map_err(|e| match e.kind() {
            std::io::ErrorKind::PermissionDenied => AttachError::PermissionDenied {
                pid,
                reason: format!("cannot create {}", tmp_trigger.display()),
            },
            _ => AttachError::Io(e),
        })?;
        Ok(tmp_trigger)
    }
}

impl Default for HotSpotAttachTransport {
    fn default() -> Self {
        Self::new("/proc", Duration::from_secs(5))
    }
}

impl AttachTransport for HotSpotAttachTransport {
    fn dial(&self, pid: u32) -> Result<Box<dyn AttachHandle>, AttachError> {
        let status = fs::read_to_string(self.process_dir(pid).join("status"))
            .map_err(|_| AttachError::ProcessNotFound(pid))?;
        let nspid = namespace_pid(&status).unwrap_or(pid);

        let socket = self.socket_path(pid, nspid);
        if !socket.exists() {
            self.ensure_signal_safe(pid, &status)?;
            self.start_listener(pid, nspid, &socket)?;
        }

        Ok(Box::new(HotSpotHandle {
            socket,
            timeout: self.timeout,
            closed: false,
        }))
    }
}

/// Handle to an attach listener. Each command uses its own connection, as
/// the JVM closes the socket after answering.
#[derive(Debug)]
pub struct HotSpotHandle {
    socket: PathBuf,
    timeout: Duration,
    closed: bool,
}

impl HotSpotHandle {
    fn jcmd(&mut self, command: &str) -> Result<String, CommandError> {
        if self.closed {
            return Err(CommandError::Closed);
        }

        let mut stream = UnixStream::connect(&self.socket)?;
        stream.set_read_timeout(Some(self.timeout))?;
        stream.set_write_timeout(Some(self.timeout))?;

        stream.write_all(&encode_request("jcmd", &[command]))?;

        let mut response = String::new();
        stream.read_to_string(&mut response)?;

        parse_response(command, &response)
    }
}

impl AttachHandle for HotSpotHandle {
    fn flags(&mut self) -> Result<String, CommandError> {
        self.jcmd("VM.flags")
    }

    fn system_properties(&mut self) -> Result<String, CommandError> {
        self.jcmd("VM.system_properties")
    }

    fn version(&mut self) -> Result<String, CommandError> {
        self.jcmd("VM.version")
    }

    fn dump_perfmap(&mut self) -> Result<String, CommandError> {
        self.jcmd("Compiler.perfmap")
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

impl Drop for HotSpotHandle {
    fn drop(&mut self) {
        self.close();
    }
}

/// `<version>\0<command>\0<arg1>\0<arg2>\0<arg3>\0`, missing args empty
fn encode_request(command: &str, args: &[&str]) -> Vec<u8> {
    let mut request = Vec::new();
    for part in [PROTOCOL_VERSION, command] {
        request.extend_from_slice(part.as_bytes());
        request.push(0);
    }
    for i in 0..3 {
        if let Some(arg) = args.get(i) {
            request.extend_from_slice(arg.as_bytes());
        }
        request.push(0);
    }
    request
}

/// The first line is a numeric status, the rest is command output
fn parse_response(command: &str, response: &str) -> Result<String, CommandError> {
    let (status_line, body) = response.split_once('\n').unwrap_or((response, ""));

    let status: i32 = status_line
        .trim()
        .parse()
        .map_err(|_| CommandError::MalformedResponse(command.to_string()))?;

    if status != 0 {
        return Err(CommandError::Failed {
            command: command.to_string(),
            status,
            message: body.trim().to_string(),
        });
    }
    Ok(body.to_string())
}

/// Innermost pid from the `NSpid:` line
fn namespace_pid(status: &str) -> Option<u32> {
    status
        .lines()
        .find_map(|line| line.strip_prefix("NSpid:"))
        .and_then(|pids| pids.split_whitespace().last())
        .and_then(|pid| pid.parse().ok())
}

fn maps_libjvm(maps: &str) -> bool {
    maps.lines()
        .filter_map(|line| line.split_whitespace().nth(5))
        .any(|path| path.ends_with("/libjvm.so"))
}

/// Whether the `SigCgt:` mask of a status file includes `SIGQUIT`
fn sigquit_caught(status: &str) -> bool {
    let mask = status
        .lines()
        .find_map(|line| line.strip_prefix("SigCgt:"))
        .and_then(|hex| u64::from_str_radix(hex.trim(), 16).ok());

    let bit = 1u64 << (Signal::SIGQUIT as i32 - 1);
    mask.is_some_and(|mask| mask & bit != 0)
}

fn signal_quit(pid: u32) -> Result<(), AttachError> {
    let raw = i32::try_from(pid).map_err(|_| AttachError::ProcessNotFound(pid))?;
    kill(Pid::from_raw(raw), Signal::SIGQUIT).map_err(|errno| match errno {
        Errno::ESRCH => AttachError::ProcessNotFound(pid),
        Errno::EPERM => AttachError::PermissionDenied {
            pid,
            reason: "not allowed to signal process".to_string(),
        },
        other => AttachError::Io(std::io::Error::from(other)),
    })
}
