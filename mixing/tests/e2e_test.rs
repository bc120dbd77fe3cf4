//! Full-stack run: four server shells on loopback TCP, one client shell
//! submitting an epoch and waiting for every completion notification.

use rand::{rngs::StdRng, SeedableRng};
use robustmix_common::field::{Fe, FieldCtx};
use robustmix_mixing::client::ClientShell;
use robustmix_mixing::config::{NetConfig, SessionConfig};
use robustmix_mixing::server::{connect_peers, ServerShell};
use robustmix_network::{ServerHooks, ServerTransport};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn sorted(mut v: Vec<Fe>) -> Vec<Fe> {
    v.sort();
    v
}

#[test]
fn loopback_committee_mixes_one_session() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("info"))
        .with_test_writer()
        .try_init();

    let n = 4;
    let l = 1;
    let sid = 7;
    let ctx = FieldCtx::from_bit_length(32).unwrap();

    // bind every acceptor first so peer connects cannot race the listeners
    let transports: Vec<ServerTransport> = (0..n)
        .map(|_| ServerTransport::bind(0, ServerHooks::default()).unwrap())
        .collect();
    let net = NetConfig {
        endpoints: transports
            .iter()
            .map(|t| ("127.0.0.1".to_owned(), t.local_port()))
            .collect(),
    };

    // shells stay alive until the client has observed every completion, so
    // notification frames are never cut off by a dropped reactor
    let stop = Arc::new(AtomicBool::new(false));
    let mut servers = Vec::new();
    for (id, transport) in transports.into_iter().enumerate() {
        let cfg = SessionConfig::new(ctx.clone(), n, id + 1, l);
        let net = net.clone();
        let stop = Arc::clone(&stop);
        servers.push(thread::spawn(move || {
            let peers = connect_peers(&cfg, &net);
            let mut shell = ServerShell::new(cfg, transport, peers);
            let done = shell.run_one_session();
            while !stop.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(1));
            }
            done
        }));
    }

    let client_cfg = SessionConfig::new(ctx.clone(), n, 0, l);
    let shell = ClientShell::connect(client_cfg.clone(), &net);
    let mut rng = StdRng::seed_from_u64(211);
    let msgs: Vec<Fe> = (0..client_cfg.num_messages)
        .map(|_| ctx.random(&mut rng))
        .collect();
    shell.submit_session(sid, &msgs, &mut rng).unwrap();
    shell.wait_for_completion(sid);
    stop.store(true, Ordering::SeqCst);

    let expected = sorted(msgs);
    for server in servers {
        let (done_sid, output) = server.join().unwrap();
        assert_eq!(done_sid, sid);
        assert_eq!(sorted(output), expected);
    }
}
