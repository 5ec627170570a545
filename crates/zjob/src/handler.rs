//! The application-supplied request handler.

pub use zmq::Message;

/// Turns one request into one reply.
///
/// A single handler instance is shared by every worker thread in a pool and
/// may be invoked from all of them at once, hence the `Send + Sync` bound.
/// Each call must return exactly one reply; the broker sends it back to the
/// client unchanged.
///
/// Calls are synchronous: a handler that blocks holds its worker for the
/// whole duration, reducing pool capacity by one until it returns.
///
/// If `handle` panics, the worker catches the panic, logs it and replies with
/// an empty message so the client's request/reply cycle still completes.
///
/// Closures implement this trait:
///
/// ```
/// use zjob::{Handler, Message};
///
/// let echo = |request: Message| request;
/// let reply = echo.handle(Message::from(&b"ping"[..]));
/// assert_eq!(&reply[..], b"ping");
/// ```
pub trait Handler: Send + Sync + 'static {
    fn handle(&self, request: Message) -> Message;
}

impl<F> Handler for F
where
    F: Fn(Message) -> Message + Send + Sync + 'static,
{
    fn handle(&self, request: Message) -> Message {
        self(request)
    }
}
