//! Local IPC between command invocations and the monitor process.
//!
//! Commands send one-shot notifications through [`IpcClient`]; the monitor
//! receives them with [`IpcServer`]. Messages are newline-delimited JSON
//! (see [`protocol`]).

mod client;
mod event;
pub mod protocol;
mod server;

pub use client::{DEFAULT_SEND_TIMEOUT, IpcClient};
pub use event::IpcEvent;
pub use protocol::{IpcMessage, ProtocolError, deserialize_message, serialize_message};
pub use server::{
    BoxError, EventCallback, IpcServer, MAX_BUFFERED_BYTES, READ_CHUNK_SIZE, SOCKET_BACKLOG,
    TransportError,
};
