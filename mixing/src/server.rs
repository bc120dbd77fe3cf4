//! The server shell: owns the accepting transport, one outbound link per
//! committee peer, and the table of live sessions keyed by session id.
//! Frames are drained from the transport, deserialized, and dispatched to
//! the session they belong to; sessions are created lazily on the first
//! frame with an unknown id and erased once they complete.

use crate::config::{NetConfig, SessionConfig};
use crate::session::{MixState, MixingSession};
use robustmix_common::field::Fe;
use robustmix_network::{ClientTransport, DeserializedMessage, ServerHooks, ServerTransport, SharedQueue};
use std::collections::HashMap;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

/// Connects to every other committee member, retrying until each accept
/// succeeds. The own slot stays `None`.
pub fn connect_peers(cfg: &SessionConfig, net: &NetConfig) -> Vec<Option<ClientTransport>> {
    let mut peers: Vec<Option<ClientTransport>> = Vec::with_capacity(cfg.n);
    for (i, (host, port)) in net.endpoints.iter().enumerate() {
        if i == cfg.server_id - 1 {
            peers.push(None);
            continue;
        }
        loop {
            match ClientTransport::connect(host, *port) {
                Ok(link) => {
                    info!(server_id = cfg.server_id, peer = i + 1, host = %host, port, "peer connection established");
                    peers.push(Some(link));
                    break;
                }
                Err(err) => {
                    warn!(server_id = cfg.server_id, peer = i + 1, %err, "peer connection failed, retrying");
                    thread::sleep(Duration::from_secs(2));
                }
            }
        }
    }
    peers
}

pub struct ServerShell {
    cfg: SessionConfig,
    transport: ServerTransport,
    peers: Vec<Option<ClientTransport>>,
    sessions: HashMap<u32, MixingSession>,
    queue: SharedQueue<DeserializedMessage>,
    corrupted_clients: HashMap<u32, bool>,
    corrupted_servers: HashMap<u32, bool>,
}

impl ServerShell {
    pub fn new(
        cfg: SessionConfig,
        transport: ServerTransport,
        peers: Vec<Option<ClientTransport>>,
    ) -> Self {
        let corrupted_clients = (0..cfg.num_messages as u32).map(|i| (i, false)).collect();
        let corrupted_servers = (0..cfg.n as u32).map(|i| (i, false)).collect();
        Self {
            cfg,
            transport,
            peers,
            sessions: HashMap::new(),
            queue: SharedQueue::new(),
            corrupted_clients,
            corrupted_servers,
        }
    }

    /// Binds the accepting side on this server's configured endpoint with
    /// the default hooks.
    pub fn bind(cfg: SessionConfig, net: &NetConfig) -> std::io::Result<ServerTransport> {
        let port = net.endpoints[cfg.server_id - 1].1;
        ServerTransport::bind(port, ServerHooks::default())
    }

    pub fn local_port(&self) -> u16 {
        self.transport.local_port()
    }

    /// Drains the transport and advances every touched session. Returns the
    /// id and output of a session that completed during this pass, if any.
    pub fn pump(&mut self) -> Option<(u32, Vec<Fe>)> {
        self.transport
            .update(self.cfg.ctx.element_width(), &self.queue, usize::MAX);
        while let Some(dm) = self.queue.pop_front() {
            let sid = dm.sid;
            let session = self.sessions.entry(sid).or_insert_with(|| {
                info!(sid, "creating a session");
                MixingSession::new(sid, &self.cfg)
            });
            session.handle_message(dm, &self.cfg);
            session.execute(
                &self.peers,
                &self.cfg,
                &mut self.corrupted_clients,
                &mut self.corrupted_servers,
            );
            if session.state() == MixState::Completed {
                let done = self.sessions.remove(&sid).expect("session present");
                info!(sid, "session completed, erasing");
                self.corrupted_clients.values_mut().for_each(|v| *v = false);
                let output = done.output().map(<[Fe]>::to_vec).unwrap_or_default();
                return Some((sid, output));
            }
        }
        None
    }

    /// Blocks until some session runs to completion.
    pub fn run_one_session(&mut self) -> (u32, Vec<Fe>) {
        loop {
            if let Some(done) = self.pump() {
                return done;
            }
            thread::sleep(Duration::from_micros(500));
        }
    }
}
