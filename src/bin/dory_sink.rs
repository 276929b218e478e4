//! dory_sink - local receiver for testing producers
//!
//! Binds a UNIX datagram socket (and optionally a UNIX stream socket),
//! validates every datagram the way the daemon does, and logs what arrives.
//!
//! Usage:
//!   dory_sink --socket-path /tmp/dory.sock [--stream-socket-path /tmp/dory.stream] [-v]

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use clap::Parser;
use tracing::{error, info};

use dory_client::network::Sink;

#[derive(Parser, Debug)]
#[command(name = "dory_sink", version, about = "Receive and validate Dory datagrams")]
struct Cli {
    /// Pathname of UNIX domain datagram socket to bind.
    #[arg(long, value_name = "PATH", env = "DORY_SOCKET_PATH")]
    socket_path: PathBuf,

    /// Pathname of UNIX domain stream socket to bind.
    #[arg(long, value_name = "PATH", env = "DORY_STREAM_SOCKET_PATH")]
    stream_socket_path: Option<PathBuf>,

    /// Seconds between stats lines; 0 disables them.
    #[arg(long, default_value_t = 5)]
    stats_interval: u64,

    /// Log every accepted datagram.
    #[arg(short, long)]
    verbose: bool,
}

fn run(cli: &Cli, running: &AtomicBool) -> std::io::Result<()> {
    let mut sink = Sink::bind(&cli.socket_path, cli.stream_socket_path.as_deref())?;

    let start_time = Instant::now();
    let mut last_stats = Instant::now();
    let stats_interval = Duration::from_secs(cli.stats_interval);
    let verbose = cli.verbose;

    while running.load(Ordering::Relaxed) {
        sink.poll_once(Some(Duration::from_millis(200)), |view| {
            if verbose {
                info!(
                    topic = view.topic,
                    timestamp = view.timestamp,
                    partition_key = ?view.partition_key(),
                    key_len = view.key.len(),
                    value_len = view.value.len(),
                    "datagram"
                );
            }
        })?;

        if cli.stats_interval > 0 && last_stats.elapsed() >= stats_interval {
            sink.stats().log(start_time.elapsed());
            last_stats = Instant::now();
        }
    }

    sink.stats().log(start_time.elapsed());
    Ok(())
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .init();

    install_shutdown_handler();

    if let Err(e) = run(&cli, &RUNNING) {
        error!(error = %e, "sink failed");
        std::process::exit(1);
    }
    info!("shutting down");
}

static RUNNING: AtomicBool = AtomicBool::new(true);

extern "C" fn on_signal(_: libc::c_int) {
    RUNNING.store(false, Ordering::Relaxed);
}

/// SIGINT/SIGTERM stop the poll loop so the sink removes its socket files on exit.
fn install_shutdown_handler() {
    let handler = on_signal as extern "C" fn(libc::c_int);
    // SAFETY: the handler only stores to an atomic, which is async-signal-safe.
    unsafe {
        libc::signal(libc::SIGINT, handler as libc::sighandler_t);
        libc::signal(libc::SIGTERM, handler as libc::sighandler_t);
    }
}
