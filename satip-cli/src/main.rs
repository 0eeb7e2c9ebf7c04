//! Terminal demo for the SAT>IP tuner client: wires the session engine
//! up to in-memory stand-ins for RTSP/RTP/RTCP/discovery so the state
//! machine can be driven and inspected without real tuner hardware.

use std::io;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;

use satip::collaborators::{
    PollToken, Poller, RtspConnection, RtspMethod, RtspStatus, StreamConsumer,
};
use satip::config::TunerConfig;
use satip::registry::ServerRegistry;
use satip::server::ServerRecord;
use satip::session::SessionEngine;

#[derive(Parser)]
#[command(
    name = "satip-tuner-cli",
    about = "Demo driver for the SAT>IP tuner client"
)]
struct Args {
    /// SAT>IP server address to register and tune against.
    #[arg(long, short, default_value = "192.168.1.50")]
    server: String,

    /// Server model string, e.g. "DVBS2-2,DVBT-1".
    #[arg(long, default_value = "DVBS2-2")]
    model: String,

    /// Server description (drives quirk/CI detection).
    #[arg(long, default_value = "Generic SAT>IP Server")]
    description: String,

    /// Tuning parameter string, e.g. "src=1&freq=12207&pol=h&msys=dvbs2&mtype=8psk&sr=27500&fec=3/4".
    #[arg(long, default_value = "src=1&freq=12207&pol=h&msys=dvbs2")]
    params: String,
}

/// An RTSP connection stand-in that always answers 200 OK. Stands in
/// for the wire-level collaborator this crate does not implement.
struct LoopbackRtsp;

impl RtspConnection for LoopbackRtsp {
    fn send(&self, method: RtspMethod, uri: &str) -> satip::Result<(RtspStatus, Vec<u8>)> {
        println!("  -> {method:?} {uri}");
        Ok((RtspStatus { code: 200 }, b"ver=1.0;tuner=0,224,1,15".to_vec()))
    }
    fn poll_inbound(&self) -> Option<Vec<u8>> {
        None
    }
    fn reset(&self) -> satip::Result<()> {
        Ok(())
    }
    fn close(&self) {}
    fn session_timeout(&self) -> Option<Duration> {
        Some(Duration::from_secs(60))
    }
}

struct NullPoller;
impl Poller for NullPoller {
    fn register(&self) -> PollToken {
        PollToken(0)
    }
    fn deregister(&self, _token: PollToken) {}
}

struct NeverIdleConsumer {
    tuned: AtomicBool,
}
impl StreamConsumer for NeverIdleConsumer {
    fn is_idle(&self) -> bool {
        false
    }
    fn on_tuned(&self) {
        if !self.tuned.swap(true, Ordering::SeqCst) {
            println!("  consumer notified: channel tuned");
        }
    }
    fn on_data(&self, _data: &[u8]) {}
}

fn main() {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let registry = ServerRegistry::new();
    let record = ServerRecord::new(
        None,
        args.server.clone(),
        554,
        &args.model,
        "",
        args.description.clone(),
        false,
    );
    let record = registry.insert(record);
    println!("registered server:\n{}", registry.format());

    let config = Arc::new(TunerConfig::default());
    let rtsp = Arc::new(LoopbackRtsp);
    let poller = Arc::new(NullPoller);
    let consumer = Arc::new(NeverIdleConsumer {
        tuned: AtomicBool::new(false),
    });

    let engine = Arc::new(SessionEngine::new(
        0,
        Ipv4Addr::LOCALHOST.into(),
        config,
        rtsp,
        poller,
        consumer,
    ));

    if !engine.sockets_acquired() {
        eprintln!("failed to acquire RTP/RTCP sockets");
        return;
    }

    engine.set_source(Some(record), 0, &args.params, 0, false);
    engine.start();

    println!("tuner running — press Enter to stop");
    let mut input = String::new();
    io::stdin().read_line(&mut input).unwrap();

    engine.stop();
    println!("final state: {:?}", engine.state());
}
