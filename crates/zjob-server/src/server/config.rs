use anyhow::bail;
use clap::{Parser, ValueEnum};
use core::time::Duration;
use zjob::PoolConfig;

/// Built-in request handlers the server can host.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    /// Reply with the request bytes unchanged.
    Echo,
    /// Reply with the request bytes in reverse order.
    Reverse,
    /// Reply with ASCII letters upper-cased; other bytes pass through.
    Uppercase,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Compact,
}

/// Runtime configuration for the `zjob-server` binary.
///
/// All values are parsed from CLI arguments or environment variables (a `.env`
/// file is loaded first), with defaults suitable for running a local broker.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "zjob-server",
    version,
    about = "A ZeroMQ worker-pool broker serving a built-in handler"
)]
pub struct CliArgs {
    /// Pool name, used in thread names and logs.
    ///
    /// Environment variable: `POOL_NAME`
    #[arg(long, env = "POOL_NAME", default_value_t = String::from("zjob"))]
    pub pool_name: String,

    /// Address the public ROUTER endpoint binds to.
    ///
    /// Environment variable: `BIND_ADDRESS`
    #[arg(long, env = "BIND_ADDRESS", default_value_t = String::from("0.0.0.0"))]
    pub address: String,

    /// TCP port for the public endpoint. `0` picks an ephemeral port, which is
    /// logged at startup.
    ///
    /// Environment variable: `BIND_PORT`
    #[arg(long, env = "BIND_PORT", default_value_t = 5555)]
    pub port: u16,

    /// Number of worker threads. `0` uses every available CPU; a negative value
    /// means one.
    ///
    /// Environment variable: `NUM_WORKERS`
    #[arg(long, env = "NUM_WORKERS", default_value_t = 0, allow_negative_numbers = true)]
    pub workers: i32,

    /// Number of ZeroMQ I/O threads, resolved like `--workers`.
    ///
    /// Environment variable: `IO_THREADS`
    #[arg(long, env = "IO_THREADS", default_value_t = 0, allow_negative_numbers = true)]
    pub io_threads: i32,

    /// Handler served by every worker.
    ///
    /// Environment variable: `HANDLER`
    #[arg(long, env = "HANDLER", value_enum, default_value_t = HandlerKind::Echo)]
    pub handler: HandlerKind,

    /// How long to wait at startup for every worker to subscribe to the
    /// shutdown broadcast, in milliseconds.
    ///
    /// Environment variable: `HANDSHAKE_TIMEOUT_MS`
    #[arg(long, env = "HANDSHAKE_TIMEOUT_MS", default_value_t = 5000)]
    pub handshake_timeout_ms: u64,

    /// Socket linger on shutdown, in milliseconds. `-1` waits for undelivered
    /// replies forever.
    ///
    /// Environment variable: `LINGER_MS`
    #[arg(long, env = "LINGER_MS", default_value_t = 0, allow_negative_numbers = true)]
    pub linger_ms: i32,

    /// Console log layout.
    ///
    /// Environment variable: `LOG_FORMAT`
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub pool: PoolConfig,
    pub handler: HandlerKind,
    pub log_format: LogFormat,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.handshake_timeout_ms == 0 {
            bail!("HANDSHAKE_TIMEOUT_MS must be greater than 0");
        }

        if args.handshake_timeout_ms > i32::MAX as u64 {
            bail!(
                "HANDSHAKE_TIMEOUT_MS ({}) exceeds the maximum of {}",
                args.handshake_timeout_ms,
                i32::MAX
            );
        }

        if args.linger_ms < -1 {
            bail!("LINGER_MS must be -1 or greater");
        }

        let pool = PoolConfig::new(args.pool_name, args.address, args.port)
            .with_workers(args.workers)
            .with_io_threads(args.io_threads)
            .with_linger_ms(args.linger_ms)
            .with_handshake_timeout(Duration::from_millis(args.handshake_timeout_ms));

        pool.validate()?;

        Ok(Self {
            pool,
            handler: args.handler,
            log_format: args.log_format,
        })
    }
}
