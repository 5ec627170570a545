use crate::{
    Endpoints, Error, Result,
    error::{InitContext, InitStage},
    pool::control,
};
use std::thread::{self, JoinHandle};

/// Sockets owned by the orchestrator thread.
///
/// `frontend` and `backend` are bound by the pool before any worker
/// connects. Like the worker sockets, they return through
/// [`Orchestrator::join`] so they outlive the thread polling them.
pub(crate) struct OrchestratorSockets {
    frontend: zmq::Socket,
    backend: zmq::Socket,
    control: zmq::Socket,
}

impl OrchestratorSockets {
    /// Binds the public ROUTER and the internal DEALER and subscribes to the
    /// control broadcast.
    ///
    /// The control endpoint must already be bound.
    pub(crate) fn bind(
        context: &zmq::Context,
        endpoints: &Endpoints,
        linger_ms: i32,
    ) -> Result<Self> {
        let frontend = context.socket(zmq::ROUTER).stage(InitStage::Socket)?;
        frontend
            .set_linger(linger_ms)
            .stage(InitStage::SocketOption)?;
        frontend
            .bind(&endpoints.frontend)
            .stage(InitStage::Bind)?;

        let backend = context.socket(zmq::DEALER).stage(InitStage::Socket)?;
        backend
            .set_linger(linger_ms)
            .stage(InitStage::SocketOption)?;
        backend.bind(&endpoints.backend).stage(InitStage::Bind)?;

        let control = control::subscribe(context, &endpoints.control, linger_ms)?;

        Ok(Self {
            frontend,
            backend,
            control,
        })
    }

    /// The address the ROUTER actually bound, resolving wildcard ports.
    pub(crate) fn frontend_endpoint(&self) -> Option<String> {
        match self.frontend.get_last_endpoint() {
            Ok(Ok(endpoint)) => Some(endpoint),
            _ => None,
        }
    }
}

/// Handle to the running orchestrator thread.
pub(crate) struct Orchestrator {
    thread: JoinHandle<OrchestratorSockets>,
}

impl Orchestrator {
    pub(crate) fn spawn(pool: &str, sockets: OrchestratorSockets) -> Result<Self> {
        let thread = thread::Builder::new()
            .name(format!("{pool}-orchestrator"))
            .spawn(move || orchestrator_loop(sockets))
            .stage(InitStage::Spawn)?;

        Ok(Self { thread })
    }

    pub(crate) fn join(self) -> Result<OrchestratorSockets> {
        let thread = self
            .thread
            .thread()
            .name()
            .unwrap_or("orchestrator")
            .to_string();

        self.thread
            .join()
            .map_err(|_| Error::ThreadPanicked { thread })
    }
}

/// Relays messages between the ROUTER and the DEALER until the control
/// broadcast fires.
///
/// Each wake-up moves at most one complete message per direction. Which
/// worker receives a request is left to the DEALER's fair queuing. The
/// ROUTER's identity frames travel as ordinary frames, which is how replies
/// find their way back to the right client.
pub(crate) fn orchestrator_loop(sockets: OrchestratorSockets) -> OrchestratorSockets {
    tracing::trace!("Orchestrator started");

    loop {
        let mut items = [
            sockets.frontend.as_poll_item(zmq::POLLIN),
            sockets.backend.as_poll_item(zmq::POLLIN),
            sockets.control.as_poll_item(zmq::POLLIN),
        ];

        if let Err(e) = zmq::poll(&mut items, -1) {
            tracing::warn!("Orchestrator poll failed: {e}");
            continue;
        }

        let (requests, replies, shutdown) = (
            items[0].is_readable(),
            items[1].is_readable(),
            items[2].is_readable(),
        );

        if requests {
            if let Err(e) = relay(&sockets.frontend, &sockets.backend) {
                tracing::warn!("Failed to relay request to workers: {e}");
            }
        }

        if replies {
            if let Err(e) = relay(&sockets.backend, &sockets.frontend) {
                tracing::warn!("Failed to relay reply to client: {e}");
            }
        }

        if shutdown {
            tracing::debug!("Orchestrator received shutdown signal");
            break;
        }
    }

    tracing::trace!("Orchestrator stopped");

    sockets
}

/// Moves one complete multipart message from `from` to `to`, frame by frame,
/// preserving each frame's continuation flag.
///
/// If a send fails mid-message, the rest of that message is read and dropped
/// so the next relay starts on a message boundary. If a receive fails after
/// frames were already forwarded, the partial message on `to` is closed
/// instead.
pub(crate) fn relay(from: &zmq::Socket, to: &zmq::Socket) -> zmq::Result<usize> {
    let mut frames = 0;
    loop {
        let frame = match from.recv_msg(0) {
            Ok(frame) => frame,
            Err(e) => {
                if frames > 0 {
                    close_partial(to);
                }
                return Err(e);
            }
        };
        let more = frame.get_more();

        if let Err(e) = to.send(frame, if more { zmq::SNDMORE } else { 0 }) {
            if more {
                discard_rest(from);
            }
            return Err(e);
        }
        frames += 1;

        if !more {
            return Ok(frames);
        }
    }
}

fn discard_rest(from: &zmq::Socket) {
    while let Ok(frame) = from.recv_msg(0) {
        if !frame.get_more() {
            break;
        }
    }
}

/// Terminates a message left open with `SNDMORE`.
fn close_partial(to: &zmq::Socket) {
    if let Err(e) = to.send(zmq::Message::new(), 0) {
        tracing::warn!("Failed to close partially relayed message: {e}");
    }
}
