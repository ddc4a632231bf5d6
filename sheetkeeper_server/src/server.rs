// TCP server for a single campaign.
//
// Architecture: thread per connection, shared store.
//
// - **Listener thread**: nonblocking `accept()` loop that polls
//   `keep_running` between attempts. Each accepted stream is registered in
//   the connection table and handed to a new worker thread.
// - **Worker threads** (one per client): own that client's `Session`. They
//   read an envelope, feed it to the session, and write back every reply
//   before reading the next one, so replies to one client are strictly
//   ordered. All workers share one `Arc<CampaignStore>`; the store's locks
//   are the only synchronization between them.
//
// A frame that arrives intact but does not decode to an envelope is logged
// and skipped. An I/O error or end of stream ends that connection only.
//
// Shutdown: `ServerHandle::stop` clears `keep_running`. The listener thread
// then leaves its loop, shuts down every socket still in the connection
// table so workers blocked in `read` return, and joins the workers.

use std::collections::HashMap;
use std::io::{self, BufReader, BufWriter};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use sheetkeeper_protocol::codec::{WireError, read_envelope, write_envelope};

use crate::error::StartError;
use crate::session::Session;
use crate::store::CampaignStore;

pub const DEFAULT_PORT: u16 = 6666;

const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Open sockets by connection id, kept so shutdown can unblock workers.
type ConnectionTable = Arc<Mutex<HashMap<u64, TcpStream>>>;

/// Configuration for starting a campaign server.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub data_root: PathBuf,
    pub campaign: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: DEFAULT_PORT,
            data_root: PathBuf::from("."),
            campaign: String::new(),
        }
    }
}

/// Handle returned by `start_server` to control the running server.
pub struct ServerHandle {
    keep_running: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl ServerHandle {
    /// Stop accepting, disconnect every client, and wait for all threads.
    pub fn stop(mut self) {
        self.keep_running.store(false, Ordering::SeqCst);
        self.join_listener();
    }

    /// Block until the server stops. Only returns early if the listener
    /// thread dies on its own.
    pub fn join(mut self) {
        self.join_listener();
    }

    fn join_listener(&mut self) {
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                tracing::error!("listener thread panicked");
            }
        }
    }
}

/// Open the configured campaign and start serving it on a background
/// thread. Returns the handle and the bound address (port 0 lets the OS
/// pick one).
pub fn start_server(config: ServerConfig) -> Result<(ServerHandle, SocketAddr), StartError> {
    let store = Arc::new(CampaignStore::open(&config.data_root, &config.campaign)?);
    let listener = TcpListener::bind((config.host.as_str(), config.port))?;
    let addr = listener.local_addr()?;
    listener.set_nonblocking(true)?;
    tracing::info!(%addr, campaign = store.campaign(), "server listening");

    let keep_running = Arc::new(AtomicBool::new(true));
    let keep_running_listener = Arc::clone(&keep_running);
    let thread = thread::Builder::new()
        .name("sheetkeeper-listener".into())
        .spawn(move || accept_loop(listener, store, keep_running_listener))?;

    Ok((
        ServerHandle {
            keep_running,
            thread: Some(thread),
        },
        addr,
    ))
}

fn accept_loop(listener: TcpListener, store: Arc<CampaignStore>, keep_running: Arc<AtomicBool>) {
    let connections: ConnectionTable = Arc::default();
    let mut workers: Vec<thread::JoinHandle<()>> = Vec::new();
    let mut next_id: u64 = 0;

    while keep_running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => {
                next_id += 1;
                match spawn_worker(next_id, stream, peer, &store, &connections) {
                    Ok(worker) => workers.push(worker),
                    Err(e) => tracing::warn!(%peer, error = %e, "could not start connection"),
                }
                workers.retain(|worker| !worker.is_finished());
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => {
                tracing::error!(error = %e, "accept failed, no longer listening");
                break;
            }
        }
    }

    let open: Vec<TcpStream> = connections
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .drain()
        .map(|(_, stream)| stream)
        .collect();
    for stream in open {
        // The peer may already be gone; nothing to do then.
        let _ = stream.shutdown(Shutdown::Both);
    }
    for worker in workers {
        if worker.join().is_err() {
            tracing::error!("connection thread panicked");
        }
    }
    tracing::info!("server stopped");
}

fn spawn_worker(
    id: u64,
    stream: TcpStream,
    peer: SocketAddr,
    store: &Arc<CampaignStore>,
    connections: &ConnectionTable,
) -> io::Result<thread::JoinHandle<()>> {
    stream.set_nonblocking(false)?;
    let reader = BufReader::new(stream.try_clone()?);
    let registered = stream.try_clone()?;
    let writer = BufWriter::new(stream);
    connections
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(id, registered);

    let session = Session::new(Arc::clone(store));
    let table = Arc::clone(connections);
    let spawned = thread::Builder::new()
        .name(format!("sheetkeeper-conn-{id}"))
        .spawn(move || {
            let span = tracing::info_span!("connection", id, %peer);
            let _entered = span.enter();
            tracing::info!("client connected");
            serve_connection(session, reader, writer);
            table
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&id);
            tracing::info!("client disconnected");
        });
    if spawned.is_err() {
        connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }
    spawned
}

/// Read-dispatch-reply loop for one client.
fn serve_connection(
    mut session: Session,
    mut reader: BufReader<TcpStream>,
    mut writer: BufWriter<TcpStream>,
) {
    loop {
        let message = match read_envelope(&mut reader) {
            Ok(Some(message)) => message,
            Ok(None) => break,
            Err(WireError::Malformed(e)) => {
                tracing::warn!(error = %e, "ignoring malformed message");
                continue;
            }
            Err(WireError::Io(e)) => {
                tracing::debug!(error = %e, "connection read failed");
                break;
            }
        };

        tracing::trace!(kind = ?message.kind, "request");
        for reply in session.handle(message) {
            if let Err(e) = write_envelope(&mut writer, &reply) {
                tracing::debug!(error = %e, "connection write failed");
                return;
            }
        }
        if session.is_closed() {
            break;
        }
    }
}
