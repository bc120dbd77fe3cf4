use robustmix_common::basis;
use robustmix_common::field::{FieldCtx, FieldError};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Error that occurs while loading the startup configuration. All variants
/// are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Unreadable {
        path: String,
        source: std::io::Error,
    },
    #[error("{path}: expected {what}")]
    Malformed { path: String, what: &'static str },
    #[error(transparent)]
    Field(#[from] FieldError),
}

fn read_tokens(path: &Path) -> Result<Vec<String>, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
        path: path.display().to_string(),
        source,
    })?;
    Ok(text.split_whitespace().map(str::to_owned).collect())
}

fn malformed(path: &Path, what: &'static str) -> ConfigError {
    ConfigError::Malformed {
        path: path.display().to_string(),
        what,
    }
}

/// The mpc configuration file: prime bit length, committee size, own id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MpcConfig {
    pub prime_bits: u32,
    pub n: usize,
    pub server_id: usize,
}

impl MpcConfig {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let tokens = read_tokens(path)?;
        let mut tokens = tokens.iter();
        let mut next = |what| {
            tokens
                .next()
                .and_then(|t| t.parse::<u64>().ok())
                .ok_or_else(|| malformed(path, what))
        };
        Ok(Self {
            prime_bits: next("a prime bit length")? as u32,
            n: next("the number of servers")? as usize,
            server_id: next("a server id")? as usize,
        })
    }
}

/// The mix configuration file: the single encoding parameter L.
pub fn read_mix_config(path: &Path) -> Result<usize, ConfigError> {
    let tokens = read_tokens(path)?;
    tokens
        .first()
        .and_then(|t| t.parse::<usize>().ok())
        .filter(|&l| l >= 1)
        .ok_or_else(|| malformed(path, "the mixing parameter L"))
}

/// The network configuration file: one `<ip> <port>` pair per server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetConfig {
    pub endpoints: Vec<(String, u16)>,
}

impl NetConfig {
    pub fn from_path(path: &Path, n: usize) -> Result<Self, ConfigError> {
        let tokens = read_tokens(path)?;
        if tokens.len() < 2 * n {
            return Err(malformed(path, "one `<ip> <port>` line per server"));
        }
        let mut endpoints = Vec::with_capacity(n);
        for pair in tokens.chunks_exact(2).take(n) {
            let port = pair[1]
                .parse::<u16>()
                .map_err(|_| malformed(path, "a port number"))?;
            endpoints.push((pair[0].clone(), port));
        }
        Ok(Self { endpoints })
    }
}

/// Immutable parameters of one mixing session. `t` follows the committee
/// rule `t = (n - 1) / 4` when `n` is a multiple of four and `n / 4`
/// otherwise; `num_messages = 14 L^2 + 10 L - 1`.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub ctx: FieldCtx,
    pub n: usize,
    pub t: usize,
    /// This server's id in `1..=n`; 0 marks a client.
    pub server_id: usize,
    /// Share-packing block size.
    pub block_len: usize,
    /// The encoding parameter L.
    pub l: usize,
    /// Messages mixed per epoch.
    pub num_messages: usize,
}

impl SessionConfig {
    pub fn new(ctx: FieldCtx, n: usize, server_id: usize, l: usize) -> Self {
        let t = if n % 4 != 0 { n / 4 } else { (n - 1) / 4 };
        Self {
            ctx,
            n,
            t,
            server_id,
            block_len: 1,
            l,
            num_messages: basis::num_messages(l),
        }
    }

    pub fn encoding_len(&self) -> usize {
        basis::encoding_len(self.l)
    }

    /// Blocks per batched open, with a possibly ragged tail block.
    pub fn num_blocks(&self) -> usize {
        self.num_messages.div_ceil(self.block_len)
    }

    pub fn last_block_len(&self) -> usize {
        self.num_messages % self.block_len
    }
}
