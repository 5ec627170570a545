use crate::{
    Endpoints, Error, Handler, Result,
    error::{InitContext, InitStage},
    pool::control,
};
use std::{
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    thread::{self, JoinHandle},
};
use zmq::Message;

/// Sockets owned by one worker thread.
///
/// They move into the thread when it starts and come back through
/// [`Worker::join`], so the pool closes them only after the thread that polls
/// them has exited.
pub(crate) struct WorkerSockets {
    responder: zmq::Socket,
    control: zmq::Socket,
}

impl WorkerSockets {
    /// Opens a REP socket on the pool's DEALER and a SUB on its control
    /// broadcast.
    pub(crate) fn connect(
        context: &zmq::Context,
        endpoints: &Endpoints,
        linger_ms: i32,
    ) -> Result<Self> {
        let control = control::subscribe(context, &endpoints.control, linger_ms)?;

        let responder = context.socket(zmq::REP).stage(InitStage::Socket)?;
        responder
            .set_linger(linger_ms)
            .stage(InitStage::SocketOption)?;
        responder
            .connect(&endpoints.backend)
            .stage(InitStage::Connect)?;

        Ok(Self { responder, control })
    }
}

/// What a worker thread hands back when it stops.
pub(crate) struct WorkerExit {
    pub(crate) sockets: WorkerSockets,
    pub(crate) served: u64,
}

/// Handle to a running worker thread.
pub(crate) struct Worker {
    id: usize,
    thread: JoinHandle<WorkerExit>,
}

impl Worker {
    pub(crate) fn spawn(
        pool: &str,
        id: usize,
        sockets: WorkerSockets,
        handler: Arc<dyn Handler>,
    ) -> Result<Self> {
        let thread = thread::Builder::new()
            .name(format!("{pool}-worker-{id}"))
            .spawn(move || worker_loop(id, sockets, handler))
            .stage(InitStage::Spawn)?;

        Ok(Self { id, thread })
    }

    pub(crate) fn id(&self) -> usize {
        self.id
    }

    /// Waits for the worker to observe shutdown and exit.
    pub(crate) fn join(self) -> Result<WorkerExit> {
        let thread = self
            .thread
            .thread()
            .name()
            .map_or_else(|| format!("worker-{}", self.id), str::to_string);

        self.thread
            .join()
            .map_err(|_| Error::ThreadPanicked { thread })
    }
}

/// Serves requests until the control broadcast fires.
///
/// Each iteration blocks on both sockets with no timeout. A ready request is
/// always answered before a shutdown notice seen in the same iteration is
/// acted on; there is no mid-request cancellation.
pub(crate) fn worker_loop(
    worker_id: usize,
    sockets: WorkerSockets,
    handler: Arc<dyn Handler>,
) -> WorkerExit {
    tracing::trace!("Worker {worker_id} started");

    let mut served = 0_u64;

    loop {
        let mut items = [
            sockets.responder.as_poll_item(zmq::POLLIN),
            sockets.control.as_poll_item(zmq::POLLIN),
        ];

        if let Err(e) = zmq::poll(&mut items, -1) {
            tracing::warn!("Worker {worker_id} poll failed: {e}");
            continue;
        }

        let request_ready = items[0].is_readable();
        let shutdown_ready = items[1].is_readable();

        if request_ready && serve_request(worker_id, &sockets.responder, handler.as_ref()) {
            served += 1;
        }

        if shutdown_ready {
            tracing::debug!("Worker {worker_id} received shutdown signal");
            break;
        }
    }

    tracing::trace!("Worker {worker_id} stopped after serving {served} requests");

    WorkerExit { sockets, served }
}

/// Receives one request, runs the handler and sends its reply.
///
/// Returns `true` if a reply was sent.
fn serve_request(worker_id: usize, responder: &zmq::Socket, handler: &dyn Handler) -> bool {
    let request = match responder.recv_msg(0) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!("Worker {worker_id} failed to receive request: {e}");
            return false;
        }
    };

    if request.get_more() {
        let dropped = discard_continuation(responder);
        tracing::warn!("Worker {worker_id} discarded {dropped} trailing request frames");
    }

    let reply = match panic::catch_unwind(AssertUnwindSafe(|| handler.handle(request))) {
        Ok(reply) => reply,
        Err(_) => {
            tracing::error!("Worker {worker_id} handler panicked; replying with empty message");
            Message::new()
        }
    };

    if let Err(e) = responder.send(reply, 0) {
        tracing::warn!("Worker {worker_id} failed to send reply: {e}");
        return false;
    }

    true
}

/// Drains the remaining frames of a multipart request.
fn discard_continuation(socket: &zmq::Socket) -> usize {
    let mut dropped = 0;
    loop {
        match socket.recv_msg(0) {
            Ok(frame) => {
                dropped += 1;
                if !frame.get_more() {
                    return dropped;
                }
            }
            Err(_) => return dropped,
        }
    }
}
