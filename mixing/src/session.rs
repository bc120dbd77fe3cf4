//! The per-session mixing state machine. One instance per session id drives
//! the protocol: collect the encoded client submissions, verify their
//! format through a two-round batched open of the well-formedness
//! predicates, decompress the surviving encodings into shared power sums,
//! open those through a second two-round batch, and finally convert the
//! reconstructed power sums into a symmetric polynomial whose roots are the
//! mixed plaintexts.
//!
//! The driver is cooperative: [`MixingSession::execute`] advances state by
//! state and returns whenever it reaches a wait state whose reception
//! bitmap is incomplete; the shell re-enters it on every delivered frame.

use crate::config::SessionConfig;
use num_traits::Zero;
use rand::rngs::StdRng;
use rand::SeedableRng;
use robustmix_common::basis;
use robustmix_common::field::Fe;
use robustmix_common::poly;
use robustmix_common::roots;
use robustmix_common::share;
use robustmix_network::{Connection, DeserializedMessage, Frame, MessageHeader};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Protocol states. The discriminants are wire-visible: peers put them in
/// `mixing_state_id`, and outgoing round frames carry `current state + 1`
/// so the receiver matches them to its own wait state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum MixState {
    WaitForInputs = 0,
    GetRandCoin = 1,
    ComputeWellformednessPredicates = 2,
    BatchedOpenWfPredicates1 = 3,
    BatchedOpenWfPredicates2 = 4,
    BatchedOpenWfPredicates3 = 5,
    BatchedOpenWfPredicates4 = 6,
    OpenCheckWfPredicates = 7,
    DecompressClientInputs = 8,
    ComputeSumOfPowers = 9,
    BatchedOpenSumsOfPowers5 = 10,
    BatchedOpenSumsOfPowers6 = 11,
    BatchedOpenSumsOfPowers7 = 12,
    BatchedOpenSumsOfPowers8 = 13,
    ComputeNewtonIdAndFindRoots = 14,
    Completed = 15,
}

impl MixState {
    pub fn from_u16(v: u16) -> Option<Self> {
        use MixState::*;
        Some(match v {
            0 => WaitForInputs,
            1 => GetRandCoin,
            2 => ComputeWellformednessPredicates,
            3 => BatchedOpenWfPredicates1,
            4 => BatchedOpenWfPredicates2,
            5 => BatchedOpenWfPredicates3,
            6 => BatchedOpenWfPredicates4,
            7 => OpenCheckWfPredicates,
            8 => DecompressClientInputs,
            9 => ComputeSumOfPowers,
            10 => BatchedOpenSumsOfPowers5,
            11 => BatchedOpenSumsOfPowers6,
            12 => BatchedOpenSumsOfPowers7,
            13 => BatchedOpenSumsOfPowers8,
            14 => ComputeNewtonIdAndFindRoots,
            15 => Completed,
            _ => return None,
        })
    }
}

/// Outbound link to one committee peer. The production implementation is a
/// [`robustmix_network::ClientTransport`]; tests substitute in-memory
/// routers.
pub trait PeerLink {
    fn is_connected(&self) -> bool;
    fn send_elements(&self, sid: u32, sender_id: u32, mixing_state_id: u16, elems: &[Fe], width: usize);
}

impl PeerLink for robustmix_network::ClientTransport {
    fn is_connected(&self) -> bool {
        robustmix_network::ClientTransport::is_connected(self)
    }

    fn send_elements(&self, sid: u32, sender_id: u32, mixing_state_id: u16, elems: &[Fe], width: usize) {
        robustmix_network::ClientTransport::send_elements(
            self,
            sid,
            sender_id,
            mixing_state_id,
            elems,
            width,
        )
    }
}

/// A committee member has no link to itself; the session skips its own slot
/// and stores its contribution locally.
impl<T: PeerLink> PeerLink for Option<T> {
    fn is_connected(&self) -> bool {
        self.as_ref().is_some_and(|p| p.is_connected())
    }

    fn send_elements(&self, sid: u32, sender_id: u32, mixing_state_id: u16, elems: &[Fe], width: usize) {
        if let Some(p) = self {
            p.send_elements(sid, sender_id, mixing_state_id, elems, width);
        }
    }
}

/// Low bytes of the coin-seed accumulator as a PRNG key.
fn seed_key(seed: &Fe) -> [u8; 32] {
    let bytes = seed.to_bytes_le();
    let mut key = [0u8; 32];
    let n = bytes.len().min(32);
    key[..n].copy_from_slice(&bytes[..n]);
    key
}

pub struct MixingSession {
    pub sid: u32,
    state: MixState,
    /// Per-round reception bitmap over the committee; monotone within a
    /// round, self-marked on send.
    reception: Vec<Vec<bool>>,
    encoding_len: usize,
    num_blocks: usize,
    size_last: usize,
    xvals: Vec<Fe>,
    /// Preprocessed `prod (x - xvals[i])` for the Reed-Solomon decoder.
    g0: Vec<Fe>,
    /// Accumulator seeding the deterministic well-formedness coins; the
    /// whole committee starts from the same value.
    coin_seed: Fe,
    client_input: Vec<Vec<Fe>>,
    preds: Vec<Fe>,
    decompressed: Vec<Vec<Fe>>,
    shared_sums_of_powers: Vec<Fe>,
    /// Expanded shares received in rounds 1 and 3, block-major.
    recv_expanded: Vec<Vec<Fe>>,
    /// Per-peer openings returned in round 2 (predicates).
    opened_wf: Vec<Vec<Fe>>,
    /// Per-peer openings returned in round 4 (power sums).
    opened_sop: Vec<Vec<Fe>>,
    client_msg_counter: usize,
    client_conns: BTreeMap<u32, Arc<Connection>>,
    output: Option<Vec<Fe>>,
    e2e_start: Option<Instant>,
    wf_start: Option<Instant>,
}

impl MixingSession {
    pub fn new(sid: u32, cfg: &SessionConfig) -> Self {
        let xvals = share::gen_xvals(&cfg.ctx, cfg.n);
        let g0 = poly::build_from_roots(&cfg.ctx, &xvals);
        let num_blocks = cfg.num_blocks();
        let size_last = cfg.last_block_len();
        let empty_matrix = || vec![vec![Fe::zero(); cfg.n]; num_blocks];
        Self {
            sid,
            state: MixState::WaitForInputs,
            reception: vec![vec![false; cfg.n]; 4],
            encoding_len: cfg.encoding_len(),
            num_blocks,
            size_last,
            xvals,
            g0,
            coin_seed: Fe::zero(),
            client_input: Vec::new(),
            preds: Vec::new(),
            decompressed: Vec::new(),
            shared_sums_of_powers: Vec::new(),
            recv_expanded: empty_matrix(),
            opened_wf: empty_matrix(),
            opened_sop: empty_matrix(),
            client_msg_counter: 0,
            client_conns: BTreeMap::new(),
            output: None,
            e2e_start: None,
            wf_start: None,
        }
    }

    pub fn state(&self) -> MixState {
        self.state
    }

    /// The recovered plaintext multiset, once the session has completed.
    pub fn output(&self) -> Option<&[Fe]> {
        self.output.as_deref()
    }

    /// Overrides the committee-wide coin seed. All members must agree.
    pub fn set_coin_seed(&mut self, seed: Fe) {
        self.coin_seed = seed;
    }

    /// Routes one deserialized frame into the session's buffers. Frames for
    /// a round already marked from the sender, with the wrong shape, or for
    /// a state that never receives are dropped and logged.
    pub fn handle_message(&mut self, dm: DeserializedMessage, cfg: &SessionConfig) {
        match MixState::from_u16(dm.mixing_state_id) {
            Some(MixState::WaitForInputs) => self.handle_submission(dm, cfg),
            Some(MixState::BatchedOpenWfPredicates2) => self.handle_round_frame(dm, cfg, 1),
            Some(MixState::BatchedOpenWfPredicates4) => self.handle_round_frame(dm, cfg, 2),
            Some(MixState::BatchedOpenSumsOfPowers6) => self.handle_round_frame(dm, cfg, 3),
            Some(MixState::BatchedOpenSumsOfPowers8) => self.handle_round_frame(dm, cfg, 4),
            _ => warn!(
                sid = self.sid,
                state_id = dm.mixing_state_id,
                sender = dm.sender_id,
                "message for a state that never receives, dropping"
            ),
        }
    }

    fn handle_submission(&mut self, mut dm: DeserializedMessage, cfg: &SessionConfig) {
        if self.client_input.is_empty() {
            debug!(sid = self.sid, "first client submission, allocating input buffers");
            self.client_input = vec![Vec::new(); cfg.num_messages];
            if let Some(conn) = dm.conn.take() {
                self.client_conns.insert(dm.sender_id, conn);
            }
        }
        let idx = dm.sender_id as usize;
        if idx >= cfg.num_messages {
            warn!(sid = self.sid, sender = dm.sender_id, "submission index out of range, dropping");
            return;
        }
        let Some(row) = dm.body.into_iter().next() else {
            warn!(sid = self.sid, sender = dm.sender_id, "submission without a body, dropping");
            return;
        };
        if row.len() != self.encoding_len {
            warn!(
                sid = self.sid,
                sender = dm.sender_id,
                len = row.len(),
                expected = self.encoding_len,
                "submission row has the wrong length, dropping"
            );
            return;
        }
        let row: Vec<Fe> = row.into_iter().map(|v| cfg.ctx.reduce(v)).collect();
        // a resubmission overwrites but never advances the counter, so a
        // colliding sender id cannot complete the input phase early
        if self.client_input[idx].is_empty() {
            self.client_msg_counter += 1;
        } else {
            debug!(sid = self.sid, sender = dm.sender_id, "duplicate submission overwritten");
        }
        self.client_input[idx] = row;
    }

    fn handle_round_frame(&mut self, dm: DeserializedMessage, cfg: &SessionConfig, round: usize) {
        let sender = dm.sender_id as usize;
        if sender == 0 || sender > cfg.n {
            warn!(sid = self.sid, sender, round, "round frame from an unknown peer, dropping");
            return;
        }
        if self.reception[round - 1][sender - 1] {
            debug!(sid = self.sid, sender, round, "peer already delivered this round, dropping");
            return;
        }
        let Some(row) = dm.body.into_iter().next() else {
            warn!(sid = self.sid, sender, round, "round frame without a body, dropping");
            return;
        };
        if row.len() != self.num_blocks {
            warn!(
                sid = self.sid,
                sender,
                round,
                len = row.len(),
                expected = self.num_blocks,
                "round frame has the wrong block count, dropping"
            );
            return;
        }
        let target = match round {
            1 | 3 => &mut self.recv_expanded,
            2 => &mut self.opened_wf,
            _ => &mut self.opened_sop,
        };
        for (b, v) in row.into_iter().enumerate() {
            target[b][sender - 1] = cfg.ctx.reduce(v);
        }
        self.reception[round - 1][sender - 1] = true;
    }

    /// Runs the state machine until it blocks on missing peer messages or
    /// completes. Corrupted clients discovered by the predicate check are
    /// recorded in `corrupted_clients`; the server map is carried for
    /// dispute resolution.
    pub fn execute<P: PeerLink>(
        &mut self,
        peers: &[P],
        cfg: &SessionConfig,
        corrupted_clients: &mut HashMap<u32, bool>,
        _corrupted_servers: &mut HashMap<u32, bool>,
    ) {
        loop {
            match self.state {
                MixState::WaitForInputs => {
                    if self.client_msg_counter != cfg.num_messages {
                        return;
                    }
                    info!(
                        sid = self.sid,
                        messages = cfg.num_messages,
                        prime_bits = cfg.ctx.modulus_bits(),
                        "all client submissions received"
                    );
                    self.client_msg_counter = 0;
                    self.state = MixState::ComputeWellformednessPredicates;
                }
                MixState::ComputeWellformednessPredicates => {
                    self.e2e_start = Some(Instant::now());
                    self.wf_start = Some(Instant::now());
                    let started = Instant::now();
                    self.compute_wellformedness_preds(cfg);
                    info!(
                        sid = self.sid,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "well-formedness predicates computed"
                    );
                    self.state = MixState::BatchedOpenWfPredicates1;
                }
                MixState::BatchedOpenWfPredicates1 => {
                    let preds = std::mem::take(&mut self.preds);
                    self.batched_open_expand_send(peers, cfg, &preds, 1);
                    self.state = MixState::BatchedOpenWfPredicates2;
                    return;
                }
                MixState::BatchedOpenWfPredicates2 => {
                    if !self.reception[0].iter().all(|&b| b) {
                        return;
                    }
                    self.state = MixState::BatchedOpenWfPredicates3;
                }
                MixState::BatchedOpenWfPredicates3 => {
                    self.open_expanded_to_all(peers, cfg, 2);
                    self.state = MixState::BatchedOpenWfPredicates4;
                    return;
                }
                MixState::BatchedOpenWfPredicates4 => {
                    if !self.reception[1].iter().all(|&b| b) {
                        return;
                    }
                    self.state = MixState::OpenCheckWfPredicates;
                }
                MixState::OpenCheckWfPredicates => {
                    let opened = std::mem::take(&mut self.opened_wf);
                    let output_preds = self.reconstruct_batched(cfg, opened);
                    for (i, p) in output_preds.iter().enumerate().take(cfg.num_messages) {
                        if !p.is_zero() {
                            warn!(sid = self.sid, client = i, "malformed submission, excluding client");
                            corrupted_clients.insert(i as u32, true);
                        }
                    }
                    if let Some(started) = self.wf_start.take() {
                        info!(
                            sid = self.sid,
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            "well-formedness check finished"
                        );
                    }
                    self.state = MixState::DecompressClientInputs;
                }
                MixState::DecompressClientInputs => {
                    let started = Instant::now();
                    self.decompress_inputs(cfg, corrupted_clients);
                    info!(
                        sid = self.sid,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "client inputs decompressed"
                    );
                    self.state = MixState::ComputeSumOfPowers;
                }
                MixState::ComputeSumOfPowers => {
                    let started = Instant::now();
                    self.compute_sums_of_powers(cfg);
                    info!(
                        sid = self.sid,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "shared sums of powers computed"
                    );
                    self.state = MixState::BatchedOpenSumsOfPowers5;
                }
                MixState::BatchedOpenSumsOfPowers5 => {
                    let sums = std::mem::take(&mut self.shared_sums_of_powers);
                    self.batched_open_expand_send(peers, cfg, &sums, 3);
                    self.state = MixState::BatchedOpenSumsOfPowers6;
                    return;
                }
                MixState::BatchedOpenSumsOfPowers6 => {
                    if !self.reception[2].iter().all(|&b| b) {
                        return;
                    }
                    self.state = MixState::BatchedOpenSumsOfPowers7;
                }
                MixState::BatchedOpenSumsOfPowers7 => {
                    self.open_expanded_to_all(peers, cfg, 4);
                    self.state = MixState::BatchedOpenSumsOfPowers8;
                    return;
                }
                MixState::BatchedOpenSumsOfPowers8 => {
                    if !self.reception[3].iter().all(|&b| b) {
                        return;
                    }
                    self.state = MixState::ComputeNewtonIdAndFindRoots;
                }
                MixState::ComputeNewtonIdAndFindRoots => {
                    self.finish(cfg);
                    return;
                }
                MixState::Completed => return,
                MixState::GetRandCoin => {
                    error!(sid = self.sid, state = ?self.state, "reached an unhandled state");
                    return;
                }
            }
        }
    }

    /// Derives the deterministic coin vectors and evaluates the format
    /// predicate on every stored submission, share-wise.
    fn compute_wellformedness_preds(&mut self, cfg: &SessionConfig) {
        let ctx = &cfg.ctx;
        let coins_per_input = self.encoding_len - 1;
        let draw_bits = 2 * ctx.modulus_bits();
        let mut preds = Vec::with_capacity(cfg.num_messages);
        for i in 0..cfg.num_messages {
            let mut coins = Vec::with_capacity(coins_per_input);
            for j in 0..coins_per_input {
                let step = ctx.from_u64((coins_per_input + i + j) as u64);
                self.coin_seed = ctx.add(&self.coin_seed, &step);
                let mut rng = StdRng::from_seed(seed_key(&self.coin_seed));
                coins.push(ctx.random_bits(&mut rng, draw_bits));
            }
            preds.push(basis::verify_format(ctx, &coins, &self.client_input[i], cfg.l));
        }
        self.preds = preds;
    }

    /// Round 1/3: expand every block of `shares` with the width-n
    /// Vandermonde map and send the i-th expanded share of each block to
    /// peer i. The own slot is stored locally and self-marked.
    fn batched_open_expand_send<P: PeerLink>(
        &mut self,
        peers: &[P],
        cfg: &SessionConfig,
        shares: &[Fe],
        round: usize,
    ) {
        let ctx = &cfg.ctx;
        let full_blocks = if self.size_last != 0 {
            self.num_blocks - 1
        } else {
            self.num_blocks
        };
        debug_assert_eq!(shares.len(), full_blocks * cfg.block_len + self.size_last);

        let mut expanded: Vec<Vec<Fe>> = vec![Vec::with_capacity(self.num_blocks); cfg.n];
        let vdm = share::vandermonde(ctx, cfg.n, cfg.block_len - 1);
        for b in 0..full_blocks {
            let block = &shares[b * cfg.block_len..(b + 1) * cfg.block_len];
            for (i, v) in share::apply_vandermonde(ctx, &vdm, block).into_iter().enumerate() {
                expanded[i].push(v);
            }
        }
        if self.size_last != 0 {
            let vdm = share::vandermonde(ctx, cfg.n, self.size_last - 1);
            let block = &shares[full_blocks * cfg.block_len..];
            for (i, v) in share::apply_vandermonde(ctx, &vdm, block).into_iter().enumerate() {
                expanded[i].push(v);
            }
        }

        let me = cfg.server_id - 1;
        let state_out = self.state as u16 + 1;
        for (i, row) in expanded.into_iter().enumerate() {
            if i == me {
                for (b, v) in row.into_iter().enumerate() {
                    self.recv_expanded[b][i] = v;
                }
                self.reception[round - 1][me] = true;
                continue;
            }
            peers[i].send_elements(
                self.sid,
                cfg.server_id as u32,
                state_out,
                &row,
                ctx.element_width(),
            );
        }
    }

    /// Round 2/4: decode each block of received expanded shares down to one
    /// opening and broadcast the openings. Decode failures substitute zero.
    fn open_expanded_to_all<P: PeerLink>(&mut self, peers: &[P], cfg: &SessionConfig, round: usize) {
        let ctx = &cfg.ctx;
        let mut opened = Vec::with_capacity(self.num_blocks);
        for (b, block) in self.recv_expanded.iter().enumerate() {
            match share::rs_decode(ctx, &self.xvals, block, &self.g0, 2 * cfg.t, 1) {
                Some(dec) => opened.push(dec.secrets[0].clone()),
                None => {
                    warn!(sid = self.sid, block = b, "opening expanded shares failed, substituting zero");
                    opened.push(Fe::zero());
                }
            }
        }

        let me = cfg.server_id - 1;
        let target = if round == 2 {
            &mut self.opened_wf
        } else {
            &mut self.opened_sop
        };
        for (b, v) in opened.iter().enumerate() {
            target[b][me] = v.clone();
        }
        self.reception[round - 1][me] = true;

        let state_out = self.state as u16 + 1;
        for (i, peer) in peers.iter().enumerate() {
            if i == me || !peer.is_connected() {
                continue;
            }
            peer.send_elements(
                self.sid,
                cfg.server_id as u32,
                state_out,
                &opened,
                ctx.element_width(),
            );
        }
    }

    /// Final block-wise reconstruction of a batched open; decode failures
    /// substitute zero secrets.
    fn reconstruct_batched(&self, cfg: &SessionConfig, opened: Vec<Vec<Fe>>) -> Vec<Fe> {
        let ctx = &cfg.ctx;
        let mut out = Vec::with_capacity(cfg.num_messages);
        for (b, block) in opened.iter().enumerate() {
            let (d, ell) = if b == self.num_blocks - 1 && self.size_last != 0 {
                (self.size_last - 1, self.size_last)
            } else {
                (cfg.block_len - 1, cfg.block_len)
            };
            match share::rs_decode(ctx, &self.xvals, block, &self.g0, d, ell) {
                Some(dec) => out.extend(dec.secrets),
                None => {
                    warn!(sid = self.sid, block = b, "reconstructing a batched block failed, substituting zeros");
                    out.extend(std::iter::repeat(Fe::zero()).take(ell));
                }
            }
        }
        out
    }

    /// Materialises the decompressed power vectors, zeroing the rows of
    /// clients flagged as corrupted.
    fn decompress_inputs(&mut self, cfg: &SessionConfig, corrupted_clients: &HashMap<u32, bool>) {
        let mut decompressed = Vec::with_capacity(cfg.num_messages);
        for (i, row) in self.client_input.iter().enumerate() {
            if corrupted_clients.get(&(i as u32)).copied().unwrap_or(false) {
                decompressed.push(vec![Fe::zero(); cfg.num_messages]);
            } else {
                decompressed.push(basis::decompress(&cfg.ctx, row, cfg.l));
            }
        }
        self.decompressed = decompressed;
        self.client_input = Vec::new();
    }

    fn compute_sums_of_powers(&mut self, cfg: &SessionConfig) {
        let ctx = &cfg.ctx;
        self.shared_sums_of_powers = (0..cfg.num_messages)
            .map(|p| {
                self.decompressed
                    .iter()
                    .fold(Fe::zero(), |acc, row| ctx.add(&acc, &row[p]))
            })
            .collect();
        self.decompressed = Vec::new();
    }

    /// Reconstructs the power sums, converts them into the symmetric
    /// polynomial, finds its roots, and notifies every recorded client.
    fn finish(&mut self, cfg: &SessionConfig) {
        let ctx = &cfg.ctx;
        let opened = std::mem::take(&mut self.opened_sop);
        let sums = self.reconstruct_batched(cfg, opened);

        let started = Instant::now();
        let sym_poly = roots::newton_to_polynomial(ctx, &sums, cfg.num_messages);
        info!(
            sid = self.sid,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "symmetric polynomial derived from the power sums"
        );

        let started = Instant::now();
        let output = roots::find_roots(ctx, &sym_poly, &mut rand::thread_rng());
        info!(
            sid = self.sid,
            elapsed_ms = started.elapsed().as_millis() as u64,
            recovered = output.len(),
            "mixing output recovered"
        );
        if output.len() < cfg.num_messages {
            warn!(
                sid = self.sid,
                recovered = output.len(),
                expected = cfg.num_messages,
                "root recovery under-delivered"
            );
        }
        if let Some(started) = self.e2e_start.take() {
            info!(
                sid = self.sid,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "session finished end to end"
            );
        }

        let response = Frame {
            header: MessageHeader {
                sid: self.sid,
                sender_id: cfg.server_id as u32,
                mixing_state_id: MixState::Completed as u16,
                time_ns: MessageHeader::now_ns(),
                ..Default::default()
            },
            body: Vec::new(),
        };
        for conn in self.client_conns.values() {
            if conn.is_connected() {
                conn.send(response.clone());
            }
        }
        // dropping the back-references here keeps completed sessions from
        // pinning client connections alive
        self.client_conns.clear();

        self.output = Some(output);
        self.state = MixState::Completed;
    }
}
