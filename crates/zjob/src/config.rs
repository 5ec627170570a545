//! Pool configuration and thread-count resolution.

use crate::{Error, Result};
use core::time::Duration;

/// Default time to wait for every control subscriber to register.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Resolves a requested thread count.
///
/// - `hint < 0` → `1`
/// - `hint == 0` → the number of available CPUs (never less than `1`)
/// - `hint > 0` → `hint`
///
/// The same policy applies to the worker count and to the transport's I/O
/// thread count.
pub fn resolve_count(hint: i32) -> usize {
    match hint {
        n if n < 0 => 1,
        0 => num_cpus::get().max(1),
        n => n as usize,
    }
}

/// Construction parameters for a [`Pool`](crate::Pool).
///
/// Thread-count hints follow [`resolve_count`]. A `port` of `0` binds an
/// ephemeral port; the bound endpoint is reported by
/// [`Pool::frontend_endpoint`](crate::Pool::frontend_endpoint).
#[derive(Clone, Debug)]
pub struct PoolConfig {
    pub name: String,
    pub io_threads: i32,
    pub workers: i32,
    pub address: String,
    pub port: u16,
    /// Linger applied to every pool socket on close, in milliseconds. `-1`
    /// waits for pending messages forever.
    pub linger_ms: i32,
    pub handshake_timeout: Duration,
}

impl PoolConfig {
    /// Creates a configuration with autodetected worker and I/O thread
    /// counts.
    pub fn new(name: impl Into<String>, address: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            io_threads: 0,
            workers: 0,
            address: address.into(),
            port,
            linger_ms: 0,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }

    pub fn with_workers(mut self, workers: i32) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_io_threads(mut self, io_threads: i32) -> Self {
        self.io_threads = io_threads;
        self
    }

    pub fn with_linger_ms(mut self, linger_ms: i32) -> Self {
        self.linger_ms = linger_ms;
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Checks that the configuration can describe a pool.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the name or address is empty, or
    /// if the handshake timeout does not fit a socket option.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidConfig {
                reason: "pool name must not be empty".to_string(),
            });
        }
        if self.address.trim().is_empty() {
            return Err(Error::InvalidConfig {
                reason: "bind address must not be empty".to_string(),
            });
        }
        if self.handshake_timeout.is_zero()
            || self.handshake_timeout.as_millis() > i32::MAX as u128
        {
            return Err(Error::InvalidConfig {
                reason: format!(
                    "handshake timeout must be between 1ms and {}ms",
                    i32::MAX
                ),
            });
        }
        Ok(())
    }

    pub(crate) fn handshake_timeout_ms(&self) -> i32 {
        self.handshake_timeout.as_millis().min(i32::MAX as u128) as i32
    }
}
