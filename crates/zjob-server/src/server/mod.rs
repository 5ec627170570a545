//! Server-side components of the `zjob-server` binary.
//!
//! - [`config`] - CLI/environment configuration and validation.
//! - [`handlers`] - Built-in request handlers.
//! - [`telemetry`] - Console logging setup.

pub mod config;
pub mod handlers;
pub mod telemetry;
