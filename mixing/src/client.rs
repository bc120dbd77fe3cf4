//! The client shell: encodes each plaintext with the additive 2-basis,
//! packed-shares every encoding coordinate across the committee, submits
//! one share row per server, and waits for the per-session completion
//! notification from all of them.

use crate::config::{NetConfig, SessionConfig};
use crate::session::MixState;
use rand::Rng;
use robustmix_common::basis;
use robustmix_common::field::Fe;
use robustmix_common::share::{self, CodingError};
use robustmix_network::ClientTransport;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub struct ClientShell {
    cfg: SessionConfig,
    servers: Vec<ClientTransport>,
}

impl ClientShell {
    /// Connects to every server, retrying until all accepts succeed.
    pub fn connect(cfg: SessionConfig, net: &NetConfig) -> Self {
        let mut servers = Vec::with_capacity(cfg.n);
        for (i, (host, port)) in net.endpoints.iter().enumerate().take(cfg.n) {
            loop {
                match ClientTransport::connect(host, *port) {
                    Ok(link) => {
                        info!(server = i + 1, host = %host, port, "connection established");
                        servers.push(link);
                        break;
                    }
                    Err(err) => {
                        warn!(server = i + 1, %err, "connection failed, retrying");
                        thread::sleep(Duration::from_secs(2));
                    }
                }
            }
        }
        Self { cfg, servers }
    }

    pub fn from_links(cfg: SessionConfig, servers: Vec<ClientTransport>) -> Self {
        Self { cfg, servers }
    }

    /// Encodes, packed-shares, and submits one plaintext per message slot.
    pub fn submit_session(
        &self,
        sid: u32,
        msgs: &[Fe],
        rng: &mut impl Rng,
    ) -> Result<(), CodingError> {
        let cfg = &self.cfg;
        let ctx = &cfg.ctx;
        let xvals = share::gen_xvals(ctx, cfg.n);
        let width = ctx.element_width();
        let mut encode_elapsed = Duration::ZERO;
        for (i, msg) in msgs.iter().enumerate() {
            let started = Instant::now();
            let encoding = basis::encode(ctx, msg, cfg.l);
            let mut rows: Vec<Vec<Fe>> = vec![Vec::with_capacity(encoding.len()); cfg.n];
            for coord in &encoding {
                let shares = share::packed_share(ctx, &xvals, &[coord.clone()], cfg.t, rng)?;
                for (k, s) in shares.into_iter().enumerate() {
                    rows[k].push(s);
                }
            }
            encode_elapsed += started.elapsed();
            for (j, row) in rows.iter().enumerate() {
                self.servers[j].submit_message(sid, i as u32, row, width);
            }
        }
        info!(
            sid,
            avg_encode_us = (encode_elapsed.as_micros() / msgs.len().max(1) as u128) as u64,
            "all messages submitted"
        );
        Ok(())
    }

    /// Polls every server connection until each has sent the completion
    /// notification for `sid`. A silent server blocks forever, matching the
    /// protocol's no-timeout discipline.
    pub fn wait_for_completion(&self, sid: u32) {
        let mut completed = vec![false; self.servers.len()];
        while !completed.iter().all(|&c| c) {
            let mut progressed = false;
            for (i, server) in self.servers.iter().enumerate() {
                if completed[i] || !server.is_connected() {
                    continue;
                }
                while let Some(rm) = server.incoming().pop_front() {
                    progressed = true;
                    if rm.frame.header.sid != sid {
                        continue;
                    }
                    if rm.frame.header.mixing_state_id != MixState::Completed as u16 {
                        continue;
                    }
                    debug!(server = i + 1, sid, "completion received");
                    completed[i] = true;
                    break;
                }
            }
            if !progressed {
                thread::sleep(Duration::from_micros(500));
            }
        }
        info!(sid, "every server reported completion");
    }
}
