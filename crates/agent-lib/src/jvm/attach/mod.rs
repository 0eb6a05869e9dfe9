//! Attach transport abstraction
//!
//! A transport opens a channel to a running JVM and runs introspection
//! commands against it. The resolver only depends on these traits, so tests
//! and alternative attach mechanisms plug in without touching it.

pub mod hotspot;

pub use hotspot::HotSpotAttachTransport;

use thiserror::Error;

/// Failure to establish an attach channel
#[derive(Debug, Error)]
pub enum AttachError {
    #[error("process {0} not found")]
    ProcessNotFound(u32),

    #[error("permission denied attaching to process {pid}: {reason}")]
    PermissionDenied { pid: u32, reason: String },

    #[error("attach to process {pid} timed out after {timeout_ms}ms")]
    Timeout { pid: u32, timeout_ms: u64 },

    #[error("process {pid} cannot be attached safely: {reason}")]
    NotAJvm { pid: u32, reason: String },

    #[error("attach is disabled")]
    Disabled,

    #[error("attach I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AttachError {
    /// Whether a later attempt may succeed. A JVM that is still starting
    /// has no signal handlers yet, and a busy one can time out.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AttachError::NotAJvm { .. } | AttachError::Timeout { .. } | AttachError::Io(_)
        )
    }
}

/// Failure of a single command on an open handle
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("command {command} failed with status {status}: {message}")]
    Failed {
        command: String,
        status: i32,
        message: String,
    },

    #[error("malformed response to {0}")]
    MalformedResponse(String),

    #[error("command {0} not supported by this transport")]
    Unsupported(String),

    #[error("handle already closed")]
    Closed,

    #[error("command I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Connects to JVM processes
pub trait AttachTransport: Send + Sync {
    fn dial(&self, pid: u32) -> Result<Box<dyn AttachHandle>, AttachError>;
}

/// An open attach channel to one JVM
pub trait AttachHandle: Send {
    /// Live flag dump (`VM.flags`)
    fn flags(&mut self) -> Result<String, CommandError>;

    fn system_properties(&mut self) -> Result<String, CommandError>;

    fn version(&mut self) -> Result<String, CommandError>;

    /// Ask the JVM to write `/tmp/perf-<pid>.map`
    fn dump_perfmap(&mut self) -> Result<String, CommandError> {
        Err(CommandError::Unsupported("Compiler.perfmap".to_string()))
    }

    /// Release the channel. Safe to call any number of times.
    fn close(&mut self);
}

/// Transport used when live attach is turned off
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledTransport;

impl AttachTransport for DisabledTransport {
    fn dial(&self, _pid: u32) -> Result<Box<dyn AttachHandle>, AttachError> {
        Err(AttachError::Disabled)
    }
}
