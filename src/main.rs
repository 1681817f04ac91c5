use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

use clap::Parser;
use log::{error, info, warn};

use jeux::client_registry::ClientRegistry;
use jeux::logging;
use jeux::player_registry::PlayerRegistry;
use jeux::service::serve_connection;
use jeux::MAX_CLIENTS;

/// Jeux tic-tac-toe game server.
#[derive(Debug, Parser)]
#[command(name = "jeux", version, about)]
struct Args {
    /// TCP port to listen on.
    #[arg(short, long)]
    port: u16,

    /// Address to bind to.
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    /// Maximum number of simultaneously connected clients; may only lower
    /// the compiled-in limit, never raise it.
    #[arg(short = 'm', long)]
    max_clients: Option<usize>,

    /// Increase log verbosity. Repeatable.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() {
    let args = Args::parse();

    if let Err(e) = logging::init(logging::verbosity_to_level(args.verbose)) {
        eprintln!("failed to initialize logging: {e}");
    }

    let max_clients = args.max_clients.map(|m| m.min(MAX_CLIENTS)).unwrap_or(MAX_CLIENTS);
    let registry = ClientRegistry::new(max_clients);
    let players = PlayerRegistry::new();

    let listener = match TcpListener::bind((args.bind.as_str(), args.port)) {
        Ok(listener) => listener,
        Err(e) => {
            error!("failed to bind {}:{}: {e}", args.bind, args.port);
            std::process::exit(1);
        }
    };
    info!("jeux listening on {}:{} (max_clients={max_clients})", args.bind, args.port);

    let local_addr = listener.local_addr().expect("bound listener has a local address");
    install_shutdown_handler(registry.clone(), local_addr);

    for stream in listener.incoming() {
        if shutdown_requested() {
            // The stream that woke us out of accept() is our own wakeup
            // connection from install_shutdown_handler, not a real client.
            break;
        }
        match stream {
            Ok(stream) => spawn_connection(stream, registry.clone(), players.clone()),
            Err(e) => {
                warn!("accept() failed: {e}");
            }
        }
    }

    info!("shutting down, waiting for {} client(s) to finish", registry.client_count());
    registry.wait_for_empty();
    info!("all clients disconnected, exiting");
}

fn spawn_connection(stream: TcpStream, registry: Arc<ClientRegistry>, players: Arc<PlayerRegistry>) {
    thread::spawn(move || {
        serve_connection(stream, registry, players);
    });
}

static SHUTDOWN: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(false);

fn shutdown_requested() -> bool {
    SHUTDOWN.load(std::sync::atomic::Ordering::SeqCst)
}

/// Installs a handler for SIGHUP/SIGTERM/SIGINT that shuts down every
/// connected client's read half so each service thread can unwind through
/// its own logout path, rather than killing connections out from under
/// them. Also dials the listener itself: `accept()` doesn't return early on
/// a signal the way a C server's does, so a throwaway self-connection is
/// what actually wakes the accept loop back up.
fn install_shutdown_handler(registry: Arc<ClientRegistry>, local_addr: std::net::SocketAddr) {
    let result = ctrlc::set_handler(move || {
        warn!("shutdown signal received, closing all client connections");
        SHUTDOWN.store(true, std::sync::atomic::Ordering::SeqCst);
        registry.shutdown_all();
        let _ = TcpStream::connect(local_addr);
    });
    if let Err(e) = result {
        warn!("failed to install signal handler: {e}");
    }
}
