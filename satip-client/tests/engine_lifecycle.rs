//! End-to-end state-machine scenarios against in-memory collaborator
//! fakes, mirroring the teacher's full-handshake integration test.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use satip::collaborators::{PollToken, Poller, RtspConnection, RtspMethod, RtspStatus, StreamConsumer};
use satip::config::TunerConfig;
use satip::registry::ServerRegistry;
use satip::server::ServerRecord;
use satip::session::SessionEngine;
use satip::state::TunerState;

struct ScriptedRtsp {
    teardown_count: AtomicU32,
    setup_count: AtomicU32,
}

impl ScriptedRtsp {
    fn new() -> Self {
        ScriptedRtsp {
            teardown_count: AtomicU32::new(0),
            setup_count: AtomicU32::new(0),
        }
    }
}

impl RtspConnection for ScriptedRtsp {
    fn send(&self, method: RtspMethod, _uri: &str) -> satip::Result<(RtspStatus, Vec<u8>)> {
        match method {
            RtspMethod::Teardown => {
                self.teardown_count.fetch_add(1, Ordering::SeqCst);
            }
            RtspMethod::Setup { .. } => {
                self.setup_count.fetch_add(1, Ordering::SeqCst);
            }
            _ => {}
        }
        Ok((RtspStatus { code: 200 }, b"ver=1.0;tuner=1,224,1,15".to_vec()))
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

struct ScriptedConsumer {
    idle: AtomicBool,
}
impl StreamConsumer for ScriptedConsumer {
    fn is_idle(&self) -> bool {
        self.idle.load(Ordering::SeqCst)
    }
    fn on_tuned(&self) {}
    fn on_data(&self, _data: &[u8]) {}
}

fn drive_until<F: Fn() -> bool>(engine: &SessionEngine, predicate: F, max_iterations: usize) {
    for _ in 0..max_iterations {
        if predicate() {
            return;
        }
        engine.step();
    }
}

#[test]
fn tune_dvbs2_with_force_pilot_server_reaches_locked() {
    let registry = ServerRegistry::new();
    // "GSSBOX" triggers ForcePilot and SessionId quirks (§3).
    let record = registry.insert(ServerRecord::new(
        None,
        "127.0.0.1".to_string(),
        554,
        "DVBS2-2",
        "",
        "GSSBOX SAT>IP Server".to_string(),
        false,
    ));

    let rtsp = Arc::new(ScriptedRtsp::new());
    let engine = Arc::new(SessionEngine::new(
        1,
        Ipv4Addr::LOCALHOST.into(),
        Arc::new(TunerConfig::default()),
        rtsp.clone(),
        Arc::new(NullPoller),
        Arc::new(ScriptedConsumer {
            idle: AtomicBool::new(false),
        }),
    ));
    assert!(engine.sockets_acquired());

    engine.set_source(
        Some(record),
        1,
        "src=1&freq=12207&pol=h&msys=dvbs2&mtype=8psk&sr=27500&fec=3/4",
        0,
        false,
    );

    drive_until(&engine, || engine.state() == TunerState::Locked, 10);
    assert_eq!(engine.state(), TunerState::Locked);
    assert!(engine.has_lock());
    assert_eq!(rtsp.setup_count.load(Ordering::SeqCst), 1);
}

#[test]
fn idle_release_after_two_consecutive_idle_observations() {
    let registry = ServerRegistry::new();
    let record = registry.insert(ServerRecord::new(
        None,
        "127.0.0.1".to_string(),
        554,
        "DVBT-1",
        "",
        "generic".to_string(),
        false,
    ));

    let rtsp = Arc::new(ScriptedRtsp::new());
    let consumer = Arc::new(ScriptedConsumer {
        idle: AtomicBool::new(false),
    });
    let mut config = TunerConfig::default();
    config.idle_check_interval = Duration::ZERO;
    config.sleep_timeout = Duration::from_millis(5);
    let engine = Arc::new(SessionEngine::new(
        2,
        Ipv4Addr::LOCALHOST.into(),
        Arc::new(config),
        rtsp.clone(),
        Arc::new(NullPoller),
        consumer.clone(),
    ));

    engine.set_source(Some(record), 0, "src=1&freq=1&msys=dvbt", 0, false);
    drive_until(&engine, || engine.state() == TunerState::Locked, 10);
    assert_eq!(engine.state(), TunerState::Locked);

    consumer.idle.store(true, Ordering::SeqCst);
    drive_until(&engine, || engine.state() == TunerState::Idle, 10);

    assert_eq!(engine.state(), TunerState::Idle);
    assert!(rtsp.teardown_count.load(Ordering::SeqCst) >= 1);
}

#[test]
fn connect_is_idempotent_once_locked_with_same_params() {
    let registry = ServerRegistry::new();
    let record = registry.insert(ServerRecord::new(
        None,
        "127.0.0.1".to_string(),
        554,
        "DVBS2-1",
        "",
        "generic".to_string(),
        false,
    ));
    let rtsp = Arc::new(ScriptedRtsp::new());
    let engine = Arc::new(SessionEngine::new(
        3,
        Ipv4Addr::LOCALHOST.into(),
        Arc::new(TunerConfig::default()),
        rtsp.clone(),
        Arc::new(NullPoller),
        Arc::new(ScriptedConsumer {
            idle: AtomicBool::new(false),
        }),
    ));

    engine.set_source(Some(record), 0, "src=1&freq=1&msys=dvbs2", 0, false);
    drive_until(&engine, || engine.state() == TunerState::Locked, 10);
    assert_eq!(engine.state(), TunerState::Locked);

    let setups_before = rtsp.setup_count.load(Ordering::SeqCst);
    engine.connect().expect("idempotent connect should succeed");
    assert_eq!(rtsp.setup_count.load(Ordering::SeqCst), setups_before);
}
