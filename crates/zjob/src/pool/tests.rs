use super::{ControlPublisher, Worker, WorkerSockets, abort_launch};
use crate::{Client, Endpoints, Error, Handler, InitStage, Message, POOL_INDEX, Pool, PoolConfig};
use std::{
    collections::HashSet,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
        mpsc,
    },
    thread,
    time::{Duration, Instant},
};

const TIMEOUT: Duration = Duration::from_secs(10);

fn echo() -> Arc<dyn Handler> {
    Arc::new(|request: Message| request)
}

fn local(name: &str) -> PoolConfig {
    PoolConfig::new(name, "127.0.0.1", 0)
}

fn client(pool: &Pool) -> Client {
    Client::connect(pool.frontend_endpoint())
        .unwrap()
        .with_timeout(TIMEOUT)
        .unwrap()
}

fn port_of(endpoint: &str) -> u16 {
    endpoint.rsplit(':').next().unwrap().parse().unwrap()
}

/// Runs `shutdown` on another thread and fails the test if it hangs.
fn shutdown_within(pool: Pool, limit: Duration) {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        tx.send(pool.shutdown()).unwrap();
    });
    rx.recv_timeout(limit)
        .expect("shutdown did not complete in time")
        .unwrap();
}

/// Counts live threads of this process whose name starts with `prefix`.
///
/// Linux truncates thread names to 15 bytes, so keep prefixes short.
#[cfg(target_os = "linux")]
fn live_threads(prefix: &str) -> usize {
    std::fs::read_dir("/proc/self/task")
        .unwrap()
        .filter_map(|task| std::fs::read_to_string(task.ok()?.path().join("comm")).ok())
        .filter(|comm| comm.trim_end().starts_with(prefix))
        .count()
}

/// Waits until exactly `expected` threads named `prefix*` are alive.
#[cfg(target_os = "linux")]
fn assert_live_threads(prefix: &str, expected: usize) {
    let deadline = Instant::now() + TIMEOUT;
    let mut live = live_threads(prefix);
    while live != expected && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
        live = live_threads(prefix);
    }
    assert_eq!(live, expected, "threads named {prefix}*");
}

fn concurrent_requests(endpoint: &str, count: usize) -> Vec<Vec<u8>> {
    let handles: Vec<_> = (0..count)
        .map(|i| {
            let endpoint = endpoint.to_string();
            thread::spawn(move || {
                let client = Client::connect(&endpoint)
                    .unwrap()
                    .with_timeout(TIMEOUT)
                    .unwrap();
                client.request(i.to_string().as_bytes()).unwrap()
            })
        })
        .collect();

    handles.into_iter().map(|h| h.join().unwrap()).collect()
}

#[test]
fn echo_pool_on_fixed_port() {
    let config = PoolConfig::new("test", "127.0.0.1", 6000)
        .with_workers(2)
        .with_io_threads(0);
    let pool = Pool::new(config.clone(), echo()).unwrap();

    assert_eq!(pool.name(), "test");
    assert_eq!(pool.workers_count(), 2);
    assert_eq!(pool.frontend_endpoint(), "tcp://127.0.0.1:6000");

    assert_eq!(client(&pool).request(b"ping").unwrap(), b"ping");

    let mut replies = concurrent_requests(pool.frontend_endpoint(), 50);
    let mut expected: Vec<Vec<u8>> = (0..50).map(|i| i.to_string().into_bytes()).collect();
    replies.sort();
    expected.sort();
    assert_eq!(replies, expected);

    shutdown_within(pool, TIMEOUT);

    // The port must be free again straight away.
    let pool = Pool::new(config, echo()).unwrap();
    assert_eq!(client(&pool).request(b"again").unwrap(), b"again");
    shutdown_within(pool, TIMEOUT);
}

#[test]
fn zero_worker_hint_uses_every_cpu() {
    let pool = Pool::new(local("auto").with_workers(0), echo()).unwrap();
    assert_eq!(pool.workers_count(), num_cpus::get());
    assert_eq!(pool.io_threads(), num_cpus::get());

    #[cfg(target_os = "linux")]
    assert_live_threads("auto-worker-", num_cpus::get());

    shutdown_within(pool, TIMEOUT);

    #[cfg(target_os = "linux")]
    assert_live_threads("auto-worker-", 0);
}

#[test]
fn negative_hints_resolve_to_one() {
    let pool = Pool::new(local("single").with_workers(-3).with_io_threads(-1), echo()).unwrap();
    assert_eq!(pool.workers_count(), 1);
    assert_eq!(pool.io_threads(), 1);
    assert_eq!(client(&pool).request(b"solo").unwrap(), b"solo");
    shutdown_within(pool, TIMEOUT);
}

#[test]
fn ephemeral_port_is_resolved() {
    let pool = Pool::new(local("ephemeral").with_workers(1), echo()).unwrap();
    assert_eq!(pool.endpoints().frontend, "tcp://127.0.0.1:*");
    assert!(port_of(pool.frontend_endpoint()) > 0);
    shutdown_within(pool, TIMEOUT);
}

#[test]
fn reply_is_exactly_what_the_handler_produced() {
    let reverse: Arc<dyn Handler> = Arc::new(|request: Message| {
        let mut bytes = request.to_vec();
        bytes.reverse();
        Message::from(bytes)
    });
    let pool = Pool::new(local("reverse").with_workers(2), reverse).unwrap();
    let client = client(&pool);

    assert_eq!(client.request(b"abc").unwrap(), b"cba");
    assert_eq!(client.request(b"").unwrap(), b"");

    let binary: Vec<u8> = (0..=255).collect();
    let mut expected = binary.clone();
    expected.reverse();
    assert_eq!(client.request(&binary).unwrap(), expected);

    shutdown_within(pool, TIMEOUT);
}

#[test]
fn many_clients_few_workers_drop_nothing() {
    let pool = Pool::new(local("fanin").with_workers(1), echo()).unwrap();

    let mut replies = concurrent_requests(pool.frontend_endpoint(), 32);
    replies.sort();
    let mut expected: Vec<Vec<u8>> = (0..32).map(|i| i.to_string().into_bytes()).collect();
    expected.sort();
    assert_eq!(replies, expected);

    shutdown_within(pool, TIMEOUT);
}

#[test]
fn requests_spread_across_worker_threads() {
    let threads = Arc::new(Mutex::new(HashSet::new()));
    let seen = Arc::clone(&threads);
    let handler: Arc<dyn Handler> = Arc::new(move |request: Message| {
        let name = thread::current().name().map(str::to_string);
        seen.lock().unwrap().insert(name);
        thread::sleep(Duration::from_millis(20));
        request
    });

    let pool = Pool::new(local("spread").with_workers(2), handler).unwrap();
    concurrent_requests(pool.frontend_endpoint(), 8);
    shutdown_within(pool, TIMEOUT);

    let threads = threads.lock().unwrap();
    assert_eq!(threads.len(), 2, "{threads:?}");
    assert!(threads.contains(&Some("spread-worker-0".to_string())));
    assert!(threads.contains(&Some("spread-worker-1".to_string())));
}

#[test]
fn handler_panic_yields_empty_reply_and_worker_survives() {
    let handler: Arc<dyn Handler> = Arc::new(|request: Message| {
        if &request[..] == b"boom" {
            panic!("handler exploded");
        }
        request
    });
    let pool = Pool::new(local("panicky").with_workers(1), handler).unwrap();
    let client = client(&pool);

    assert_eq!(client.request(b"boom").unwrap(), b"");
    assert_eq!(client.request(b"still alive").unwrap(), b"still alive");

    shutdown_within(pool, TIMEOUT);
}

#[test]
fn multipart_request_is_answered_from_first_frame() {
    let pool = Pool::new(local("multipart").with_workers(1), echo()).unwrap();
    let client = client(&pool);

    let reply = client
        .request_multipart(&[&b"first"[..], &b"second"[..], &b"third"[..]])
        .unwrap();
    assert_eq!(reply, b"first");

    // The worker is back in a clean request/reply state.
    assert_eq!(client.request(b"next").unwrap(), b"next");

    shutdown_within(pool, TIMEOUT);
}

#[test]
fn shutdown_waits_for_in_flight_handler() {
    let (started_tx, started_rx) = mpsc::channel();
    let started_tx = Mutex::new(started_tx);
    let finished = Arc::new(AtomicBool::new(false));
    let done = Arc::clone(&finished);

    let handler: Arc<dyn Handler> = Arc::new(move |request: Message| {
        started_tx.lock().unwrap().send(()).unwrap();
        thread::sleep(Duration::from_millis(300));
        done.store(true, Ordering::SeqCst);
        request
    });

    let pool = Pool::new(local("inflight").with_workers(1), handler).unwrap();
    let endpoint = pool.frontend_endpoint().to_string();
    thread::spawn(move || {
        let client = Client::connect(&endpoint)
            .unwrap()
            .with_timeout(Duration::from_secs(2))
            .unwrap();
        let _ = client.request(b"slow");
    });

    started_rx.recv_timeout(TIMEOUT).unwrap();
    shutdown_within(pool, TIMEOUT);
    assert!(finished.load(Ordering::SeqCst));
}

#[test]
fn teardown_is_bounded_when_idle() {
    let pool = Pool::new(local("idle").with_workers(4), echo()).unwrap();
    let start = Instant::now();
    shutdown_within(pool, TIMEOUT);
    assert!(start.elapsed() < TIMEOUT);
}

#[test]
fn immediate_shutdown_after_construction() {
    for _ in 0..20 {
        let pool = Pool::new(local("flash").with_workers(3), echo()).unwrap();
        shutdown_within(pool, TIMEOUT);
    }
}

#[test]
fn drop_without_shutdown_releases_port() {
    let pool = Pool::new(local("dropped").with_workers(2), echo()).unwrap();
    let port = port_of(pool.frontend_endpoint());
    assert_eq!(client(&pool).request(b"x").unwrap(), b"x");
    drop(pool);

    let pool = Pool::new(
        PoolConfig::new("rebound", "127.0.0.1", port).with_workers(1),
        echo(),
    )
    .unwrap();
    assert_eq!(client(&pool).request(b"y").unwrap(), b"y");
    shutdown_within(pool, TIMEOUT);
}

#[test]
fn pools_get_distinct_indices_and_internal_endpoints() {
    let a = Pool::new(local("a").with_workers(1), echo()).unwrap();
    let b = Pool::new(local("b").with_workers(1), echo()).unwrap();

    assert!(b.index() > a.index());
    assert_ne!(a.endpoints().backend, b.endpoints().backend);
    assert_ne!(a.endpoints().control, b.endpoints().control);
    assert!(a.endpoints().backend.contains(&a.index().to_string()));

    assert_eq!(client(&a).request(b"a").unwrap(), b"a");
    assert_eq!(client(&b).request(b"b").unwrap(), b"b");

    shutdown_within(a, TIMEOUT);
    shutdown_within(b, TIMEOUT);
}

#[test]
fn bind_conflict_fails_at_bind_stage() {
    let first = Pool::new(local("first").with_workers(1), echo()).unwrap();
    let port = port_of(first.frontend_endpoint());

    let err = Pool::new(
        PoolConfig::new("second", "127.0.0.1", port).with_workers(1),
        echo(),
    )
    .unwrap_err();
    assert_eq!(err.init_stage(), Some(InitStage::Bind));

    assert_eq!(client(&first).request(b"ok").unwrap(), b"ok");
    shutdown_within(first, TIMEOUT);
}

#[test]
fn invalid_config_is_rejected_before_binding() {
    let err = Pool::new(PoolConfig::new("", "127.0.0.1", 0), echo()).unwrap_err();
    assert!(matches!(err, Error::InvalidConfig { .. }));
}

#[test]
fn aborted_launch_joins_started_workers() {
    let context = zmq::Context::new();
    let endpoints = Endpoints::new(POOL_INDEX.allocate(), "127.0.0.1", 0);
    let control = ControlPublisher::bind(&context, &endpoints.control, 0).unwrap();

    let sockets: Vec<_> = (0..2)
        .map(|_| WorkerSockets::connect(&context, &endpoints, 0).unwrap())
        .collect();
    control.await_subscribers(2, TIMEOUT).unwrap();

    let workers: Vec<_> = sockets
        .into_iter()
        .enumerate()
        .map(|(id, sockets)| Worker::spawn("abort", id, sockets, echo()).unwrap())
        .collect();

    assert_eq!(abort_launch(&control, workers), 0);

    #[cfg(target_os = "linux")]
    assert_live_threads("abort-worker-", 0);
}
