//! Error types for the request broker.
//!
//! This module defines the central [`Error`] enum. Steady-state failures
//! inside the worker and orchestrator loops are never surfaced here: they are
//! logged and the loop retries. What reaches the caller is limited to the two
//! lifecycle edges of a [`Pool`](crate::Pool):
//!
//! - `InvalidConfig`: the [`PoolConfig`](crate::PoolConfig) was rejected
//!   before any resource was created.
//! - `Init`: a construction step failed. Everything created up to that point
//!   has already been released.
//! - `Teardown` / `ThreadPanicked`: a shutdown step failed. Teardown still ran
//!   to completion; the first failure is reported.
//! - `Transport`: a raw ZeroMQ failure outside pool lifecycle (e.g. from the
//!   [`Client`](crate::Client)).

use core::fmt;

pub type Result<T> = core::result::Result<T, Error>;

/// The pool construction step that failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InitStage {
    /// Configuring the messaging context.
    Context,
    /// Creating a socket.
    Socket,
    /// Setting a socket option.
    SocketOption,
    /// Binding an endpoint.
    Bind,
    /// Connecting to an endpoint.
    Connect,
    /// Subscribing to the control broadcast.
    Subscribe,
    /// Spawning a worker or orchestrator thread.
    Spawn,
    /// Waiting for every control subscriber to register.
    Handshake,
}

/// The pool teardown step that failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TeardownStage {
    /// Publishing the shutdown broadcast.
    Broadcast,
}

impl fmt::Display for InitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self {
            Self::Context => "context",
            Self::Socket => "socket",
            Self::SocketOption => "socket option",
            Self::Bind => "bind",
            Self::Connect => "connect",
            Self::Subscribe => "subscribe",
            Self::Spawn => "spawn",
            Self::Handshake => "handshake",
        };
        f.write_str(stage)
    }
}

impl fmt::Display for TeardownStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Broadcast => f.write_str("broadcast"),
        }
    }
}

/// Unified error type for the request broker.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The pool configuration was rejected.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// Pool construction failed at `stage`.
    #[error("Pool initialization failed at {stage} stage: {source}")]
    Init {
        stage: InitStage,
        #[source]
        source: InitCause,
    },

    /// Pool teardown failed at `stage`.
    #[error("Pool teardown failed at {stage} stage: {source}")]
    Teardown {
        stage: TeardownStage,
        #[source]
        source: zmq::Error,
    },

    /// A pool thread panicked and could not be joined cleanly.
    #[error("Thread {thread} panicked")]
    ThreadPanicked { thread: String },

    /// Underlying ZeroMQ failure.
    #[error("Transport error: {0}")]
    Transport(#[from] zmq::Error),
}

/// Root cause of an [`Error::Init`].
#[derive(thiserror::Error, Debug)]
pub enum InitCause {
    #[error(transparent)]
    Transport(#[from] zmq::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Fewer control subscribers registered than the pool spawned.
    #[error("{registered} of {expected} control subscribers registered before timeout")]
    MissingSubscribers { registered: usize, expected: usize },
}

impl Error {
    pub(crate) fn init(stage: InitStage, cause: impl Into<InitCause>) -> Self {
        Self::Init {
            stage,
            source: cause.into(),
        }
    }

    /// Returns the construction stage for [`Error::Init`], if any.
    pub fn init_stage(&self) -> Option<InitStage> {
        match self {
            Self::Init { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

/// Extension for tagging ZeroMQ results with the construction stage they
/// belong to.
pub(crate) trait InitContext<T> {
    fn stage(self, stage: InitStage) -> Result<T>;
}

impl<T, E> InitContext<T> for core::result::Result<T, E>
where
    E: Into<InitCause>,
{
    fn stage(self, stage: InitStage) -> Result<T> {
        self.map_err(|e| Error::init(stage, e))
    }
}
