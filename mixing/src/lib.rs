/// Startup configuration files and per-session parameters.
pub mod config;

/// The per-session mixing state machine.
pub mod session;

/// The accepting shell that demultiplexes frames onto sessions.
pub mod server;

/// The submitting shell.
pub mod client;

pub use config::{ConfigError, MpcConfig, NetConfig, SessionConfig};
pub use session::{MixState, MixingSession, PeerLink};
