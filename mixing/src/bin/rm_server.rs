use robustmix_common::field::FieldCtx;
use robustmix_mixing::config::{read_mix_config, MpcConfig, NetConfig, SessionConfig};
use robustmix_mixing::server::{connect_peers, ServerShell};
use std::path::Path;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() != 4 {
        eprintln!("usage: rm_server <mpc_config> <mix_config> <net_config>");
        return ExitCode::FAILURE;
    }
    match run(Path::new(&args[1]), Path::new(&args[2]), Path::new(&args[3])) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "server startup failed");
            ExitCode::FAILURE
        }
    }
}

fn run(mpc_path: &Path, mix_path: &Path, net_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let mpc = MpcConfig::from_path(mpc_path)?;
    let l = read_mix_config(mix_path)?;
    let net = NetConfig::from_path(net_path, mpc.n)?;
    let ctx = FieldCtx::from_bit_length(mpc.prime_bits)?;
    let cfg = SessionConfig::new(ctx, mpc.n, mpc.server_id, l);
    info!(
        server_id = cfg.server_id,
        n = cfg.n,
        t = cfg.t,
        l = cfg.l,
        messages = cfg.num_messages,
        prime_bits = cfg.ctx.modulus_bits(),
        "server configured"
    );

    let transport = ServerShell::bind(cfg.clone(), &net)?;
    info!(port = transport.local_port(), "listening");
    let peers = connect_peers(&cfg, &net);
    info!("all peer connections established");

    let mut shell = ServerShell::new(cfg, transport, peers);
    loop {
        let (sid, output) = shell.run_one_session();
        info!(sid, recovered = output.len(), "mixing session served");
    }
}
