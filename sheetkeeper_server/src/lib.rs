// sheetkeeper_server: campaign server, client, and console for sheetkeeper.
//
// Players connect over TCP, name themselves, claim one character in the
// campaign the server was started with, and view or edit that character's
// sheet. Character math and the wire envelope live in the leaf crates
// (`sheetkeeper_sheet`, `sheetkeeper_protocol`); this crate owns everything
// with state or sockets.
//
// Module overview:
// - `store.rs`:   File-backed campaign store. Character records and the
//                 player → character assignment table, guarded by a
//                 metadata lock and per-character locks.
// - `session.rs`: Per-connection protocol state machine. Pure message in,
//                 messages out; all persistence goes through the store.
// - `server.rs`:  TCP listener and one worker thread per connection, each
//                 driving its own `Session`.
// - `client.rs`:  Blocking request/reply client.
// - `console.rs`: Interactive console on top of the client.
// - `error.rs`:   Store, session, and startup error types.
//
// The server can run as the `sheetkeeper` binary (`main.rs`) or be embedded
// via `start_server`, which is how the integration tests use it.

pub mod client;
pub mod console;
pub mod error;
pub mod server;
pub mod session;
pub mod store;

pub use client::{CampaignClient, ClientError};
pub use console::Console;
pub use error::{SessionError, StartError, StoreError};
pub use server::{ServerConfig, ServerHandle, start_server};
pub use session::{Session, SessionState};
pub use store::CampaignStore;
