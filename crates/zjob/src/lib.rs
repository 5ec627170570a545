#![doc = include_str!("../README.md")]

mod client;
mod config;
mod endpoint;
mod error;
mod handler;
mod index;
mod pool;

pub use crate::client::*;
pub use crate::config::*;
pub use crate::endpoint::*;
pub use crate::error::{Error, InitCause, InitStage, Result, TeardownStage};
pub use crate::handler::*;
pub use crate::index::IndexAllocator;
pub use crate::pool::Pool;

pub(crate) use crate::index::POOL_INDEX;

// Public re-export so handlers can name the transport's types via
// `zjob::zmq`.
pub use zmq;
