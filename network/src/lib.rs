/// Frozen wire header and fixed-width field-element body serialisation.
pub mod wire;

/// Mutex-guarded FIFO shared between the reactor thread and the main thread.
pub mod queue;

/// One TCP connection: a reader task feeding the owner's inbound queue and a
/// writer task draining a per-connection outbound queue.
pub mod connection;

/// Accepting side: acceptor plus injectable connection/deserialisation hooks.
pub mod server;

/// Connecting side: one outbound connection with its own inbound queue.
pub mod client;

pub use connection::{Connection, ReceivedMessage};
pub use queue::SharedQueue;
pub use server::{DeserializedMessage, ServerHooks, ServerTransport};
pub use client::ClientTransport;
pub use wire::{Frame, MessageHeader, WireError, HEADER_LEN};
