//! JVM configuration resolution
//!
//! Reconciles heap and garbage collector settings from the environment
//! options, the command line and an optional live flag dump into one
//! [`JvmConfiguration`]. Everything here apart from [`attach`] is pure
//! string processing and never fails.

pub mod attach;
pub mod config;
pub mod flags;
pub mod gc;
pub mod precedence;
pub mod resolver;
pub mod size;
pub mod vendor;

#[cfg(test)]
mod tests;

pub use attach::{
    AttachError, AttachHandle, AttachTransport, CommandError, DisabledTransport,
    HotSpotAttachTransport,
};
pub use config::{HeapSetting, JvmConfiguration};
pub use gc::{FlagDialect, GcType};
pub use precedence::PERCENTAGE_SENTINEL;
pub use resolver::{
    build_fallback_blob, resolve_from_sources, JvmParamResolver, LiveDump, Resolution,
    ResolutionSource, ENV_PRECEDENCE,
};
pub use size::{parse_size, SizeFormatError};
pub use vendor::JvmVendor;
