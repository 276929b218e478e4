//! send_to_dory - kirim message ke Dory daemon
//!
//! Encodes one or more messages and sends them over a UNIX datagram socket,
//! a UNIX stream socket or local TCP. Any encode or send failure is fatal.
//!
//! Usage:
//!   send_to_dory --socket-path /var/run/dory/dory.sock --topic orders --value "hello world"
//!   echo -n payload | send_to_dory --port 9090 --topic orders --partition-key 3 --stdin

use std::io::{self, Read};
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use clap::{ArgGroup, Parser};
use tracing::{debug, error, info};

use dory_client::network::{Sender, TcpSender};
#[cfg(unix)]
use dory_client::network::{UnixDgSender, UnixStreamSender};
use dory_client::protocol::{Addressing, DatagramEncoder, Message};

#[derive(Parser, Debug)]
#[command(name = "send_to_dory", version, about = "Utility for sending messages to Dory")]
#[command(group(
    ArgGroup::new("transport")
        .required(true)
        .args(["socket_path", "stream_socket_path", "port"]),
))]
struct Cli {
    // Transport flags have no env fallback: clap would count an exported
    // variable as a choice and break the exactly-one rule.

    /// Pathname of UNIX domain datagram socket for sending messages to Dory.
    #[arg(long, value_name = "PATH")]
    socket_path: Option<PathBuf>,

    /// Pathname of UNIX domain stream socket for sending messages to Dory.
    #[arg(long, value_name = "PATH")]
    stream_socket_path: Option<PathBuf>,

    /// Local TCP port for sending messages to Dory.
    #[arg(long, value_name = "PORT", value_parser = clap::value_parser!(u16).range(1..))]
    port: Option<u16>,

    /// Kafka topic.
    #[arg(long)]
    topic: String,

    /// Partition key; selects the PartitionKey message type.
    #[arg(long, value_name = "PARTITION_KEY")]
    partition_key: Option<u32>,

    /// Message key.
    #[arg(long, default_value = "")]
    key: String,

    /// Message value.
    #[arg(long, conflicts_with = "stdin")]
    value: Option<String>,

    /// Read message value from standard input.
    #[arg(long)]
    stdin: bool,

    /// Number of messages to send.
    #[arg(long, default_value_t = 1)]
    count: u64,

    /// Message interval in microseconds. 0 sends as fast as possible.
    #[arg(long, default_value_t = 0)]
    interval: u64,

    /// Prepend incrementing count to message value.
    #[arg(long)]
    seq: bool,

    /// Pad incrementing count with leading 0s to this width.
    #[arg(long, default_value_t = 0)]
    pad: usize,

    /// Send a malformed message (size field off by one).
    #[arg(long)]
    bad: bool,

    /// If nonzero, log progress every nth message.
    #[arg(long, default_value_t = 0)]
    print: u64,

    /// Debug logging.
    #[arg(short, long)]
    verbose: bool,
}

fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn open_sender(cli: &Cli) -> Result<Box<dyn Sender>, dory_client::SendError> {
    #[cfg(unix)]
    {
        if let Some(path) = &cli.socket_path {
            return Ok(Box::new(UnixDgSender::connect(path)?));
        }
        if let Some(path) = &cli.stream_socket_path {
            return Ok(Box::new(UnixStreamSender::connect(path)?));
        }
    }
    match cli.port {
        Some(port) => Ok(Box::new(TcpSender::connect(port)?)),
        None => Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "UNIX domain sockets are not available on this platform",
        )
        .into()),
    }
}

fn build_value(cli: &Cli, base: &[u8], n: u64) -> Vec<u8> {
    let mut value = Vec::with_capacity(base.len() + cli.pad + 21);
    if cli.seq {
        value.extend_from_slice(format!("{:0width$} ", n, width = cli.pad).as_bytes());
    }
    value.extend_from_slice(base);
    value
}

fn run(cli: &Cli) -> Result<(), String> {
    let base_value = if cli.stdin {
        let mut buf = Vec::new();
        io::stdin()
            .read_to_end(&mut buf)
            .map_err(|e| format!("failed to read value from stdin: {e}"))?;
        buf
    } else {
        cli.value.clone().unwrap_or_default().into_bytes()
    };

    let addressing = match cli.partition_key {
        Some(k) => Addressing::PartitionKey(k),
        None => Addressing::AnyPartition,
    };

    let mut sender = open_sender(cli).map_err(|e| format!("failed to open sender: {e}"))?;
    let encoder = DatagramEncoder::new();
    let interval = Duration::from_micros(cli.interval);
    let mut deadline = Instant::now();

    for n in 1..=cli.count {
        let value = build_value(cli, &base_value, n);
        let msg = Message {
            topic: &cli.topic,
            timestamp: epoch_millis(),
            key: Some(cli.key.as_bytes()),
            value: &value,
        };
        let datagram = encoder
            .encode(addressing, &msg)
            .map_err(|e| format!("failed to create datagram: {e}"))?;

        let now = Instant::now();
        if deadline > now {
            thread::sleep(deadline - now);
        }
        deadline = Instant::now() + interval;

        let sent = if cli.bad {
            let mut bytes = datagram.into_vec();
            let wrong = (bytes.len() as u32).wrapping_sub(1);
            bytes[..4].copy_from_slice(&wrong.to_be_bytes());
            sender.send_bytes(&bytes)
        } else {
            sender.send(&datagram)
        };
        sent.map_err(|e| format!("failed to send message {n}: {e}"))?;

        debug!(n, "message sent");
        if cli.print != 0 && n % cli.print == 0 {
            info!("{n} messages written");
        }
    }

    Ok(())
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .init();

    if let Err(e) = run(&cli) {
        error!("{e}");
        std::process::exit(1);
    }
}
