//! JVM agent runtime: configuration and HTTP API

pub mod api;
pub mod config;
