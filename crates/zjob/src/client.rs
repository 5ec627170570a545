//! Blocking REQ client for talking to a [`Pool`](crate::Pool).
//!
//! Each [`Client`] owns its own context and one REQ socket, i.e. one logical
//! client connection with at most one outstanding request. Open one client
//! per thread to issue requests concurrently.

use crate::Result;
use core::time::Duration;

pub struct Client {
    socket: zmq::Socket,
    _context: zmq::Context,
}

impl Client {
    /// Connects to `endpoint`, e.g. the value of
    /// [`Pool::frontend_endpoint`](crate::Pool::frontend_endpoint).
    ///
    /// No timeouts are set; see [`with_timeout`](Self::with_timeout).
    pub fn connect(endpoint: &str) -> Result<Self> {
        let context = zmq::Context::new();
        let socket = context.socket(zmq::REQ)?;
        socket.set_linger(0)?;
        socket.connect(endpoint)?;
        Ok(Self {
            socket,
            _context: context,
        })
    }

    /// Bounds both the send and the receive half of [`request`](Self::request).
    ///
    /// A timed-out request leaves the REQ socket waiting for a reply that may
    /// never come, so the client should be discarded afterwards.
    pub fn with_timeout(self, timeout: Duration) -> Result<Self> {
        let ms = timeout.as_millis().min(i32::MAX as u128) as i32;
        self.socket.set_rcvtimeo(ms)?;
        self.socket.set_sndtimeo(ms)?;
        Ok(self)
    }

    /// Sends one request and waits for its reply.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`](crate::Error::Transport) with `EAGAIN` if
    /// a configured timeout elapses.
    pub fn request(&self, payload: &[u8]) -> Result<Vec<u8>> {
        self.socket.send(payload, 0)?;
        Ok(self.socket.recv_bytes(0)?)
    }

    /// Sends a multipart request and waits for its reply.
    pub fn request_multipart(&self, frames: &[&[u8]]) -> Result<Vec<u8>> {
        self.socket.send_multipart(frames.iter().copied(), 0)?;
        Ok(self.socket.recv_bytes(0)?)
    }
}
