use crate::connection::{Connection, ReceivedMessage};
use crate::queue::SharedQueue;
use crate::wire::WireError;
use num_bigint::BigUint;
use std::io;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::runtime::{Builder, Runtime};
use tracing::{info, warn};

/// Header fields plus the decoded element rows of one inbound frame.
/// `conn` points back to the originating connection when a reply path is
/// needed (client submissions); peer round messages do not use it.
#[derive(Debug, Clone)]
pub struct DeserializedMessage {
    pub sid: u32,
    pub sender_id: u32,
    pub mixing_state_id: u16,
    pub block_idx: u16,
    pub tot_num_blocks: u16,
    pub body: Vec<Vec<BigUint>>,
    pub conn: Option<Arc<Connection>>,
}

/// Injected upcalls: `on_connect` decides whether an accepted socket is
/// kept, `prepare` turns a raw frame into a [`DeserializedMessage`] given
/// the element byte width. Defaults accept everything and apply the
/// standard tail-order element decode.
pub struct ServerHooks {
    pub on_connect: Box<dyn Fn(&Arc<Connection>) -> bool + Send + Sync>,
    pub prepare:
        Box<dyn Fn(ReceivedMessage, usize) -> Result<DeserializedMessage, WireError> + Send + Sync>,
}

impl Default for ServerHooks {
    fn default() -> Self {
        Self {
            on_connect: Box::new(|conn| conn.is_connected()),
            prepare: Box::new(default_prepare),
        }
    }
}

/// The standard deserializer: one element row consumed from the body tail;
/// anything left over is a malformed frame.
pub fn default_prepare(
    msg: ReceivedMessage,
    width: usize,
) -> Result<DeserializedMessage, WireError> {
    let ReceivedMessage { conn, mut frame } = msg;
    let row = frame.take_elements(width)?;
    if !frame.body.is_empty() {
        return Err(WireError::TrailingBytes(frame.body.len()));
    }
    Ok(DeserializedMessage {
        sid: frame.header.sid,
        sender_id: frame.header.sender_id,
        mixing_state_id: frame.header.mixing_state_id,
        block_idx: frame.header.block_idx,
        tot_num_blocks: frame.header.tot_num_blocks,
        body: vec![row],
        conn: Some(conn),
    })
}

/// Accepting transport role. Owns the reactor runtime (one worker thread),
/// the listener, the accepted connections, and the raw inbound queue that
/// all of them feed.
pub struct ServerTransport {
    runtime: Runtime,
    incoming: SharedQueue<ReceivedMessage>,
    hooks: Arc<ServerHooks>,
    connections: Arc<Mutex<Vec<Arc<Connection>>>>,
    port: u16,
}

impl ServerTransport {
    /// Binds the listener (port 0 picks a free port) and starts accepting.
    pub fn bind(port: u16, hooks: ServerHooks) -> io::Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()?;
        let listener = runtime.block_on(TcpListener::bind(("0.0.0.0", port)))?;
        let port = listener.local_addr()?.port();
        let incoming = SharedQueue::new();
        let hooks = Arc::new(hooks);
        let connections = Arc::new(Mutex::new(Vec::new()));

        let accept_incoming = incoming.clone();
        let accept_hooks = Arc::clone(&hooks);
        let accept_connections = Arc::clone(&connections);
        let handle = runtime.handle().clone();
        runtime.spawn(async move {
            // peers and clients share the id space above the committee range
            let next_id = AtomicU32::new(10_000);
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        if let Err(err) = stream.set_nodelay(true) {
                            warn!(%peer, %err, "setting TCP_NODELAY failed");
                        }
                        let id = next_id.fetch_add(1, Ordering::SeqCst);
                        let conn = Connection::new(&handle, stream, id);
                        if (accept_hooks.on_connect)(&conn) {
                            conn.start_reading(&handle, accept_incoming.clone());
                            info!(id, %peer, "connection established");
                            accept_connections
                                .lock()
                                .expect("connection list lock poisoned")
                                .push(conn);
                        } else {
                            info!(%peer, "connection denied");
                        }
                    }
                    Err(err) => warn!(%err, "accepting a connection failed"),
                }
            }
        });

        info!(port, "server transport listening");
        Ok(Self {
            runtime,
            incoming,
            hooks,
            connections,
            port,
        })
    }

    pub fn local_port(&self) -> u16 {
        self.port
    }

    /// Drains up to `max` raw frames through the `prepare` hook into `out`.
    /// Malformed frames are logged and dropped.
    pub fn update(
        &self,
        width: usize,
        out: &SharedQueue<DeserializedMessage>,
        max: usize,
    ) -> usize {
        let mut count = 0;
        while count < max {
            let Some(msg) = self.incoming.pop_front() else {
                break;
            };
            match (self.hooks.prepare)(msg, width) {
                Ok(dm) => out.push_back(dm),
                Err(err) => warn!(%err, "dropping malformed frame"),
            }
            count += 1;
        }
        count
    }

    pub fn connection_count(&self) -> usize {
        self.connections
            .lock()
            .expect("connection list lock poisoned")
            .len()
    }

    /// Stops the reactor, aborting pending I/O, and joins its thread.
    pub fn shutdown(self) {
        self.runtime.shutdown_timeout(Duration::from_secs(1));
    }
}
