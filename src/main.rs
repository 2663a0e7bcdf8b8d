//! oscdev — simulated OSC board and host-side command sender.
//!
//! # Usage
//!
//! ```bash
//! # Simulated board on UDP port 10000, subscriptions kept in board.json
//! oscdev device --listen 0.0.0.0:10000 --store board.json
//!
//! # Same board over TCP (length-prefixed packets)
//! oscdev device --tcp
//!
//! # Read a value, switch the LED on, subscribe to channel 2
//! oscdev send "/analogin/0/value" "/led/state 1" "/analogin/2/autosend 1"
//!
//! # Command lines from stdin
//! echo "/system/name" | oscdev send --to 192.168.0.200:10000
//! ```

use std::fs;
use std::io::{self, BufRead};
use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, anyhow};
use clap::{Parser, Subcommand};
use log::{info, warn};

use oscdev::adapters::store::{FileStore, MemoryStore};
use oscdev::adapters::stream::StreamTransport;
use oscdev::adapters::udp::UdpTransport;
use oscdev::app::device::{Board, DEFAULT_BOARD_NAME};
use oscdev::app::ports::{SharedStore, lock_store, share_store};
use oscdev::config::ProtocolConfig;
use oscdev::drivers::adc::{AdcSignal, SimulatedAdc};
use oscdev::osc::transport::Transport;
use oscdev::osc::codec::{self, DecodeLimits};
use oscdev::osc::{io_task, text};

const DEFAULT_PORT_ADDR: &str = "0.0.0.0:10000";
const STREAM_POLL: Duration = Duration::from_millis(1);

/// OSC device control: simulated board and host-side sender
#[derive(Parser, Debug)]
#[command(name = "oscdev")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Protocol configuration file (JSON format)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a simulated board
    Device {
        /// Address to listen on
        #[arg(short, long, default_value = DEFAULT_PORT_ADDR)]
        listen: String,

        /// Serve length-prefixed packets over TCP instead of UDP
        #[arg(long)]
        tcp: bool,

        /// Persist subscriptions and settings in this file (memory if absent)
        #[arg(short, long)]
        store: Option<PathBuf>,

        /// Board name reported at /system/name
        #[arg(short, long, default_value = DEFAULT_BOARD_NAME)]
        name: String,

        /// Hold analog inputs at zero instead of sweeping them
        #[arg(long)]
        fixed: bool,
    },

    /// Send command lines to a board and print the replies
    Send {
        /// Board address
        #[arg(short, long, default_value = "127.0.0.1:10000")]
        to: String,

        /// Connect over TCP instead of UDP
        #[arg(long)]
        tcp: bool,

        /// How long to wait for replies, in milliseconds
        #[arg(short, long, default_value = "300")]
        wait_ms: u64,

        /// Command lines such as "/led/state 1" (read from stdin if none)
        commands: Vec<String>,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config_file(path)?,
        None => ProtocolConfig::default(),
    };

    match cli.command {
        Command::Device {
            listen,
            tcp,
            store,
            name,
            fixed,
        } => run_device(config, &listen, tcp, store.as_deref(), &name, fixed),
        Command::Send {
            to,
            tcp,
            wait_ms,
            commands,
        } => run_send(&config, &to, tcp, Duration::from_millis(wait_ms), commands),
    }
}

fn load_config_file(path: &Path) -> anyhow::Result<ProtocolConfig> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    ProtocolConfig::from_json(&text).map_err(|e| anyhow!("{}: {}", path.display(), e))
}

fn open_store(path: Option<&Path>) -> anyhow::Result<SharedStore> {
    Ok(match path {
        Some(path) => share_store(
            FileStore::open(path).map_err(|e| anyhow!("opening store {}: {}", path.display(), e))?,
        ),
        None => share_store(MemoryStore::new()),
    })
}

fn run_device(
    config: ProtocolConfig,
    listen: &str,
    tcp: bool,
    store_path: Option<&Path>,
    name: &str,
    fixed: bool,
) -> anyhow::Result<()> {
    let store = open_store(store_path)?;
    let config = config.with_persisted(&*lock_store(&store));

    let signal = if fixed { AdcSignal::Fixed } else { AdcSignal::Sweep };
    let getter_timeout = Duration::from_millis(u64::from(config.getter_timeout_ms));
    let adc = SimulatedAdc::spawn(signal, getter_timeout).context("starting ADC simulation")?;
    let board = Board::assemble(&config, store, name, adc).context("assembling address tree")?;
    let max_packet = config.max_packet_len as usize;

    info!("oscdev {} board '{}'", env!("CARGO_PKG_VERSION"), name);
    info!("  autosend interval: {} ms", config.autosend_interval_ms);
    info!("  max packet:        {} bytes", max_packet);

    if !tcp {
        let transport =
            UdpTransport::bind(listen).with_context(|| format!("binding UDP {listen}"))?;
        io_task::run(
            transport,
            board.dispatcher,
            Some(board.autosender),
            max_packet,
            Arc::new(AtomicBool::new(false)),
        );
        return Ok(());
    }

    let listener = TcpListener::bind(listen).with_context(|| format!("binding TCP {listen}"))?;
    info!("IO: TCP listening on {}", listener.local_addr()?);
    for stream in listener.incoming() {
        let stream = match stream {
            Ok(s) => s,
            Err(e) => {
                warn!("IO: accept failed: {}", e);
                continue;
            }
        };
        let peer = stream.peer_addr().ok();
        info!("IO: client {:?} connected", peer);
        match StreamTransport::tcp(stream, max_packet, STREAM_POLL) {
            Ok(transport) => io_task::run(
                transport,
                board.dispatcher.clone(),
                Some(board.autosender.clone()),
                max_packet,
                Arc::new(AtomicBool::new(false)),
            ),
            Err(e) => warn!("IO: cannot configure {:?}: {}", peer, e),
        }
        info!("IO: client {:?} disconnected", peer);
    }
    Ok(())
}

fn run_send(
    config: &ProtocolConfig,
    to: &str,
    tcp: bool,
    wait: Duration,
    mut commands: Vec<String>,
) -> anyhow::Result<()> {
    if commands.is_empty() {
        commands = io::stdin()
            .lock()
            .lines()
            .collect::<io::Result<_>>()
            .context("reading commands from stdin")?;
    }
    let packet = text::command_packet(commands.iter().map(String::as_str))
        .ok_or_else(|| anyhow!("no command lines starting with '/'"))?;

    let max_packet = config.max_packet_len as usize;
    let mut transport: Box<dyn Transport<Error = io::Error>> = if tcp {
        let stream = TcpStream::connect(to).with_context(|| format!("connecting to {to}"))?;
        Box::new(StreamTransport::tcp(stream, max_packet, STREAM_POLL)?)
    } else {
        Box::new(UdpTransport::connect(to).with_context(|| format!("resolving {to}"))?)
    };

    transport.write(&packet).context("sending packet")?;
    transport.flush()?;

    let deadline = Instant::now() + wait;
    let mut buf = vec![0u8; max_packet];
    while Instant::now() < deadline {
        match transport.read(&mut buf) {
            Ok(0) => thread::sleep(Duration::from_millis(2)),
            Ok(n) => match codec::decode_with(&buf[..n], DecodeLimits::from(config)) {
                Ok(messages) => {
                    for m in messages {
                        println!("{m}");
                    }
                }
                Err(e) => warn!("undecodable reply: {}", e),
            },
            Err(e) => {
                info!("connection closed: {}", e);
                break;
            }
        }
    }
    Ok(())
}
