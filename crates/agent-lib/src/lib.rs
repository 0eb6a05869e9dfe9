//! Agent library for JVM configuration monitoring
//!
//! This crate provides the core functionality for:
//! - Resolving heap and garbage collector settings of running JVMs
//! - Discovering JVM processes and their container memory
//! - Node memory pressure and OOM kill context
//! - Health checks and observability

pub mod collector;
pub mod health;
pub mod jvm;
pub mod models;
pub mod node;
pub mod observability;
pub mod oom;
pub mod process;

pub use health::{
    Component, ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{AgentMetrics, StructuredLogger};
