//! Worker pool lifecycle.
//!
//! A [`Pool`] owns one ZeroMQ context and every socket opened on it:
//!
//! ```text
//! clients (REQ) ──tcp──▶ ROUTER ─┐                ┌─▶ REP  worker 0
//!                                │  orchestrator  ├─▶ REP  worker 1
//!                                └──▶ DEALER ─────┴─▶ REP  worker N-1
//!
//! XPUB (control) ──▶ SUB orchestrator, SUB worker 0..N-1
//! ```
//!
//! Construction binds every endpoint, connects every worker socket, waits for
//! each control subscriber to register and only then starts the threads.
//! Teardown publishes a single empty control message, joins the orchestrator,
//! joins each worker and finally closes the sockets those threads handed
//! back.

mod control;
mod orchestrator;
mod worker;

#[cfg(test)]
mod tests;

use crate::{
    Endpoints, Error, Handler, POOL_INDEX, PoolConfig, Result,
    config::resolve_count,
    error::{InitContext, InitStage},
};
use control::ControlPublisher;
use orchestrator::{Orchestrator, OrchestratorSockets};
use std::sync::Arc;
use worker::{Worker, WorkerSockets};

/// A running broker: one orchestrator thread relaying a public ROUTER endpoint
/// onto `workers_count` handler threads.
///
/// Call [`shutdown`](Self::shutdown) to stop it and observe teardown errors.
/// Dropping a pool that was never shut down performs the same teardown and
/// logs any failure.
pub struct Pool {
    name: String,
    index: u64,
    io_threads: usize,
    workers_count: usize,
    endpoints: Endpoints,
    frontend_endpoint: String,
    running: Option<Running>,
    // Declared last so it is released after every socket.
    _context: zmq::Context,
}

/// Everything teardown has to stop and release, in the order it does so.
struct Running {
    control: ControlPublisher,
    orchestrator: Orchestrator,
    workers: Vec<Worker>,
}

impl Pool {
    /// Builds a pool and starts its threads.
    ///
    /// Worker and I/O thread counts are resolved from the configured hints
    /// with [`resolve_count`](crate::resolve_count). The handler is shared by
    /// every worker.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidConfig`](crate::Error::InvalidConfig) if `config`
    ///   fails validation.
    /// - [`Error::Init`](crate::Error::Init) naming the failing step. Any
    ///   thread already started is stopped and joined, and every socket
    ///   already opened is closed, before this returns.
    pub fn new(config: PoolConfig, handler: Arc<dyn Handler>) -> Result<Self> {
        config.validate()?;

        let index = POOL_INDEX.allocate();
        let io_threads = resolve_count(config.io_threads);
        let workers_count = resolve_count(config.workers);
        let endpoints = Endpoints::new(index, &config.address, config.port);
        let linger = config.linger_ms;

        let _span = tracing::debug_span!("pool", name = %config.name, index).entered();

        let context = zmq::Context::new();
        context
            .set_io_threads(io_threads as i32)
            .stage(InitStage::Context)?;

        let control = ControlPublisher::bind(&context, &endpoints.control, linger)?;
        let orchestrator_sockets = OrchestratorSockets::bind(&context, &endpoints, linger)?;
        let frontend_endpoint = orchestrator_sockets
            .frontend_endpoint()
            .unwrap_or_else(|| endpoints.frontend.clone());

        let worker_sockets = (0..workers_count)
            .map(|_| WorkerSockets::connect(&context, &endpoints, linger))
            .collect::<Result<Vec<_>>>()?;

        // One subscription per worker plus the orchestrator's.
        control.await_subscribers(workers_count + 1, config.handshake_timeout)?;

        let mut workers = Vec::with_capacity(workers_count);
        for (id, sockets) in worker_sockets.into_iter().enumerate() {
            match Worker::spawn(&config.name, id, sockets, Arc::clone(&handler)) {
                Ok(worker) => workers.push(worker),
                Err(e) => {
                    abort_launch(&control, workers);
                    return Err(e);
                }
            }
        }

        let orchestrator = match Orchestrator::spawn(&config.name, orchestrator_sockets) {
            Ok(orchestrator) => orchestrator,
            Err(e) => {
                abort_launch(&control, workers);
                return Err(e);
            }
        };

        tracing::info!(
            "Pool {} serving on {} with {} workers and {} I/O threads",
            config.name,
            frontend_endpoint,
            workers_count,
            io_threads
        );

        Ok(Self {
            name: config.name,
            index,
            io_threads,
            workers_count,
            endpoints,
            frontend_endpoint,
            running: Some(Running {
                control,
                orchestrator,
                workers,
            }),
            _context: context,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The process-unique index namespacing this pool's internal endpoints.
    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn workers_count(&self) -> usize {
        self.workers_count
    }

    pub fn io_threads(&self) -> usize {
        self.io_threads
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// The address clients should connect to.
    ///
    /// Equal to `endpoints().frontend` except that an ephemeral port is
    /// resolved to the one actually bound.
    pub fn frontend_endpoint(&self) -> &str {
        &self.frontend_endpoint
    }

    /// Stops every thread and releases every socket.
    ///
    /// Blocks until the orchestrator and all workers have exited. A request
    /// already handed to a handler is answered first; requests still queued
    /// are dropped with the sockets.
    ///
    /// # Errors
    ///
    /// Returns the first teardown failure. All remaining steps still run,
    /// except when the shutdown broadcast itself fails: no thread could then
    /// be woken, so they are left detached and that error is returned at once.
    pub fn shutdown(mut self) -> Result<()> {
        self.teardown()
    }

    fn teardown(&mut self) -> Result<()> {
        let Some(Running {
            control,
            orchestrator,
            workers,
        }) = self.running.take()
        else {
            return Ok(());
        };

        tracing::info!("Shutting down pool {} ({})", self.name, self.index);

        if let Err(e) = control.broadcast_shutdown() {
            // Nothing will wake the threads; leave them detached rather than
            // block forever on join.
            tracing::error!("Pool {} could not broadcast shutdown: {e}", self.name);
            return Err(e);
        }

        let mut first_error: Option<Error> = None;
        let mut record = |e: Error| {
            tracing::error!("{e}");
            if first_error.is_none() {
                first_error = Some(e);
            }
        };

        let orchestrator_sockets = match orchestrator.join() {
            Ok(sockets) => Some(sockets),
            Err(e) => {
                record(e);
                None
            }
        };

        let mut worker_sockets = Vec::with_capacity(workers.len());
        let mut served = 0;
        for worker in workers {
            let id = worker.id();
            match worker.join() {
                Ok(exit) => {
                    tracing::debug!("Worker {id} joined after serving {} requests", exit.served);
                    served += exit.served;
                    worker_sockets.push(exit.sockets);
                }
                Err(e) => record(e),
            }
        }

        // Every polling thread has exited; close in reverse order of creation.
        drop(worker_sockets);
        drop(orchestrator_sockets);
        drop(control);

        tracing::info!(
            "Pool {} shut down after serving {served} requests",
            self.name
        );

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        if let Err(e) = self.teardown() {
            tracing::error!("Pool {} teardown failed on drop: {e}", self.name);
        }
    }
}

impl core::fmt::Debug for Pool {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Pool")
            .field("name", &self.name)
            .field("index", &self.index)
            .field("io_threads", &self.io_threads)
            .field("workers_count", &self.workers_count)
            .field("frontend_endpoint", &self.frontend_endpoint)
            .field("running", &self.running.is_some())
            .finish()
    }
}

/// Stops threads started by a construction that then failed.
///
/// Returns how many workers could not be joined cleanly. Each failure is
/// logged; the caller still reports the error that aborted construction.
fn abort_launch(control: &ControlPublisher, workers: Vec<Worker>) -> usize {
    if let Err(e) = control.broadcast_shutdown() {
        tracing::error!("Failed to stop partially launched pool: {e}");
        return workers.len();
    }

    let mut failed = 0;
    for worker in workers {
        if let Err(e) = worker.join() {
            tracing::error!("Failed to join worker while aborting launch: {e}");
            failed += 1;
        }
    }
    failed
}
