//! Control broadcast used to stop every pool thread at once.
//!
//! The publisher is an XPUB socket with verbose subscription reporting, which
//! lets the pool count subscribers as they register. Waiting for all of them
//! before serving closes the window in which a late subscriber could miss the
//! one-shot shutdown notice.

use crate::{
    Error, Result,
    error::{InitCause, InitContext, InitStage, TeardownStage},
};
use std::time::{Duration, Instant};

/// First byte of an XPUB subscribe notice.
const SUBSCRIBE_NOTICE: u8 = 1;

pub(crate) struct ControlPublisher {
    socket: zmq::Socket,
}

impl ControlPublisher {
    pub(crate) fn bind(context: &zmq::Context, endpoint: &str, linger_ms: i32) -> Result<Self> {
        let socket = context.socket(zmq::XPUB).stage(InitStage::Socket)?;
        socket.set_linger(linger_ms).stage(InitStage::SocketOption)?;
        socket
            .set_xpub_verbose(true)
            .stage(InitStage::SocketOption)?;
        socket.bind(endpoint).stage(InitStage::Bind)?;
        Ok(Self { socket })
    }

    /// Blocks until `expected` subscribe notices have arrived or `timeout`
    /// elapses.
    ///
    /// # Errors
    ///
    /// Returns [`InitStage::Handshake`] with
    /// [`InitCause::MissingSubscribers`] on timeout.
    pub(crate) fn await_subscribers(&self, expected: usize, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut registered = 0;

        while registered < expected {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(missing(registered, expected));
            }
            let remaining_ms = remaining.as_millis().clamp(1, i32::MAX as u128) as i32;
            self.socket
                .set_rcvtimeo(remaining_ms)
                .stage(InitStage::SocketOption)?;

            match self.socket.recv_bytes(0) {
                Ok(notice) if notice.first() == Some(&SUBSCRIBE_NOTICE) => {
                    registered += 1;
                    tracing::trace!("Control subscriber {registered}/{expected} registered");
                }
                Ok(_) => {}
                Err(zmq::Error::EAGAIN) => return Err(missing(registered, expected)),
                Err(zmq::Error::EINTR) => {}
                Err(e) => return Err(Error::init(InitStage::Handshake, e)),
            }
        }

        Ok(())
    }

    /// Publishes the empty shutdown notice to every subscriber.
    pub(crate) fn broadcast_shutdown(&self) -> Result<()> {
        self.socket
            .send(zmq::Message::new(), 0)
            .map_err(|source| Error::Teardown {
                stage: TeardownStage::Broadcast,
                source,
            })
    }
}

/// Opens a SUB socket that receives every control broadcast.
pub(crate) fn subscribe(
    context: &zmq::Context,
    endpoint: &str,
    linger_ms: i32,
) -> Result<zmq::Socket> {
    let socket = context.socket(zmq::SUB).stage(InitStage::Socket)?;
    socket.set_linger(linger_ms).stage(InitStage::SocketOption)?;
    socket.connect(endpoint).stage(InitStage::Connect)?;
    socket.set_subscribe(b"").stage(InitStage::Subscribe)?;
    Ok(socket)
}

fn missing(registered: usize, expected: usize) -> Error {
    Error::init(
        InitStage::Handshake,
        InitCause::MissingSubscribers {
            registered,
            expected,
        },
    )
}
