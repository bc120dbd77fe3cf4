use robustmix_common::field::{Fe, FieldCtx};
use robustmix_mixing::client::ClientShell;
use robustmix_mixing::config::{read_mix_config, MpcConfig, NetConfig, SessionConfig};
use std::path::Path;
use std::process::ExitCode;
use std::time::Instant;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() != 4 {
        eprintln!("usage: rm_client <mpc_config> <mix_config> <net_config>");
        return ExitCode::FAILURE;
    }
    match run(Path::new(&args[1]), Path::new(&args[2]), Path::new(&args[3])) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "client startup failed");
            ExitCode::FAILURE
        }
    }
}

fn run(mpc_path: &Path, mix_path: &Path, net_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let mpc = MpcConfig::from_path(mpc_path)?;
    let l = read_mix_config(mix_path)?;
    let net = NetConfig::from_path(net_path, mpc.n)?;
    let ctx = FieldCtx::from_bit_length(mpc.prime_bits)?;
    // server_id 0 marks the client role
    let cfg = SessionConfig::new(ctx, mpc.n, 0, l);
    info!(
        n = cfg.n,
        t = cfg.t,
        l = cfg.l,
        messages = cfg.num_messages,
        prime_bits = cfg.ctx.modulus_bits(),
        "client configured"
    );

    let shell = ClientShell::connect(cfg.clone(), &net);
    let mut rng = rand::thread_rng();
    let msgs: Vec<Fe> = (0..cfg.num_messages).map(|_| cfg.ctx.random(&mut rng)).collect();

    let sid = 0;
    let started = Instant::now();
    shell.submit_session(sid, &msgs, &mut rng)?;
    shell.wait_for_completion(sid);
    info!(
        sid,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "mixing round trip finished"
    );
    Ok(())
}
