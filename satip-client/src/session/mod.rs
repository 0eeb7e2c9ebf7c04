//! Session engine (C6): drives RTSP methods, keep-alive, retuning, and
//! reception probes; owns the pending PID deltas and runs the state
//! machine loop of §4.5.

pub mod vars;

use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::collaborators::{
    PollToken, Poller, RtspConnection, RtspMethod, SessionCallbacks, StreamConsumer,
};
use crate::config::TunerConfig;
use crate::error::{Result, SatipError};
use crate::pid::PidSet;
use crate::reception::parse_tuner_status;
use crate::server::ServerRecord;
use crate::socket::{SocketPair, acquire_rtp_rtcp_sockets};
use crate::state::{QueueKind, StateMachine, TunerState};
use crate::url::{apply_force_pilot, join_params, setup_url, stream_url};

use vars::SessionVars;

/// A device identifier uniquely naming this engine's tuner within a
/// server's frontend pools.
pub type DeviceId = u32;

/// One per-device tuner session engine. Owns its sockets, deadlines,
/// and PID sets (§3 Ownership); holds only a weak (`Arc` + `active`
/// flag) reference to the server record it is bound to.
pub struct SessionEngine {
    device_id: DeviceId,
    config: Arc<TunerConfig>,
    state: Arc<StateMachine>,
    vars: Mutex<SessionVars>,
    rtsp: Arc<dyn RtspConnection>,
    poller: Arc<dyn Poller>,
    consumer: Arc<dyn StreamConsumer>,
    sockets: Mutex<Option<SocketPair>>,
    rtp_token: Mutex<Option<PollToken>>,
    rtcp_token: Mutex<Option<PollToken>>,
    running: Arc<AtomicBool>,
}

impl SessionEngine {
    /// Construct the engine and perform socket acquisition. Per §7,
    /// `Fatal` is logged here but does not prevent construction — the
    /// engine is returned and simply fails every subsequent `Connect`.
    pub fn new(
        device_id: DeviceId,
        bind_addr: IpAddr,
        config: Arc<TunerConfig>,
        rtsp: Arc<dyn RtspConnection>,
        poller: Arc<dyn Poller>,
        consumer: Arc<dyn StreamConsumer>,
    ) -> Self {
        let sockets = match acquire_rtp_rtcp_sockets(bind_addr, config.port_range) {
            Ok(pair) => Some(pair),
            Err(e) => {
                tracing::error!(device_id, error = %e, "fatal: could not acquire RTP/RTCP sockets");
                None
            }
        };

        let rtp_token = sockets.as_ref().map(|_| poller.register());
        let rtcp_token = sockets.as_ref().map(|_| poller.register());

        SessionEngine {
            device_id,
            config,
            state: Arc::new(StateMachine::new()),
            vars: Mutex::new(SessionVars::new()),
            rtsp,
            poller,
            consumer,
            sockets: Mutex::new(sockets),
            rtp_token: Mutex::new(rtp_token),
            rtcp_token: Mutex::new(rtcp_token),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// True once RTP/RTCP sockets were successfully bound at
    /// construction. Callers should treat `false` as a fatal setup
    /// failure and not call [`Self::start`].
    pub fn sockets_acquired(&self) -> bool {
        self.sockets.lock().is_some()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TunerState {
        self.state.current()
    }

    /// `"connection failed"` while below `Tuned`, matching §7's
    /// observable failure surface.
    pub fn get_information(&self) -> String {
        if matches!(self.state(), TunerState::Tuned | TunerState::Locked) {
            "connected".to_string()
        } else {
            "connection failed".to_string()
        }
    }

    pub fn has_lock(&self) -> bool {
        self.state() == TunerState::Locked && self.vars.lock().reception_has_lock
    }

    // ---- §4.7 public contracts -------------------------------------

    /// Store the next server binding and (re-)derive the base URL and
    /// parameter string, applying the `ForcePilot` quirk. Enqueues
    /// internal `Release` on a server change, otherwise honours
    /// `needs_reconnect`; always enqueues external `Set`.
    pub fn set_source(
        &self,
        server: Option<Arc<ServerRecord>>,
        transponder: u32,
        params: &str,
        _index: u32,
        needs_reconnect: bool,
    ) {
        let mut vars = self.vars.lock();

        let Some(server) = server else {
            vars.base_url.clear();
            vars.params.clear();
            vars.next_server = None;
            return;
        };

        vars.transponder = transponder;
        vars.next_server = Some(server.clone());

        if !server.address().is_empty() && !params.is_empty() {
            let params = if server.quirks().contains(crate::server::Quirks::FORCE_PILOT) {
                apply_force_pilot(params)
            } else {
                params.to_string()
            };
            let new_base_url = server.base_url();

            let server_changed =
                !vars.last_base_url.is_empty() && vars.last_base_url != new_base_url;

            vars.base_url = new_base_url;
            vars.params = params;
            vars.needs_reconnect = needs_reconnect;
            drop(vars);

            if server_changed {
                self.state.request_state(TunerState::Release, QueueKind::Internal);
            }
        }

        self.state.request_state(TunerState::Set, QueueKind::External);
        let mut vars = self.vars.lock();
        vars.setup_watchdog_deadline = Instant::now() + self.config.setup_timeout;
    }

    /// Adjust the committed PID set and pending deltas; wakes the
    /// engine loop. Removing a PMT PID arms the PMT linger deadline.
    pub fn set_pid(&self, pid: u16, is_pmt: bool, add: bool) {
        let mut vars = self.vars.lock();
        if add {
            let _ = vars.committed.add_pid(pid);
            let _ = vars.pending_adds.add_pid(pid);
            vars.pending_dels.remove_pid(pid);
            if is_pmt {
                let _ = vars.pmt_pids.add_pid(pid);
            }
        } else {
            vars.committed.remove_pid(pid);
            let _ = vars.pending_dels.add_pid(pid);
            vars.pending_adds.remove_pid(pid);
            if is_pmt {
                vars.pmt_pid_linger_deadline = Some(Instant::now() + self.config.pmt_linger);
            }
        }
        drop(vars);
        self.state.request_state(self.state.current(), QueueKind::External);
    }

    /// Set the optional CI slot (`x_ci`). `None` omits the parameter.
    pub fn set_ci_slot(&self, slot: Option<u16>) {
        self.vars.lock().ci_slot = slot;
    }

    // ---- §4.6 core operations ---------------------------------------

    /// Idempotent retune / fresh-session negotiation, per the four
    /// numbered cases of §4.6.
    pub fn connect(&self) -> Result<()> {
        let mut vars = self.vars.lock();

        // Case 1: idempotent retune.
        if vars.stream_id >= 0 && vars.params == vars.last_params && vars.reception_has_lock {
            tracing::debug!(device_id = self.device_id, "connect: idempotent, no traffic");
            return Ok(());
        }

        // Case 2: pure retune via PLAY.
        if vars.stream_id >= 0 {
            let uri = stream_url(&vars.base_url, vars.stream_id, &vars.params);
            let params_sent = vars.params.clone();
            drop(vars);
            match self.rtsp.send(RtspMethod::Play, &uri) {
                Ok((status, _)) if status.is_success() => {
                    let mut vars = self.vars.lock();
                    vars.last_params = params_sent;
                    vars.keep_alive_deadline = Instant::now() + self.timeout();
                    tracing::info!(device_id = self.device_id, %uri, "retuned via PLAY");
                    return Ok(());
                }
                _ => {
                    tracing::warn!(device_id = self.device_id, %uri, "retune PLAY failed, falling back");
                }
            }
            vars = self.vars.lock();
        }

        // Case 3: fresh session.
        let base = vars.base_url.clone();
        let params = vars.params.clone();
        let transport_tcp = matches!(self.current_quirks(&vars), Some(q) if q.contains(crate::server::Quirks::RTP_OVER_TCP))
            && self.config.transport_mode == crate::config::TransportMode::RtpOverTcp;
        let source_address = vars
            .next_server
            .as_ref()
            .and_then(|s| s.source_address())
            .map(str::to_string);
        drop(vars);

        if let Err(e) = self.rtsp.bind_source_address(source_address.as_deref()) {
            tracing::warn!(device_id = self.device_id, error = %e, "source-address bind failed");
        }

        if let Err(e) = self.rtsp.send(RtspMethod::Options, &base) {
            tracing::warn!(device_id = self.device_id, error = %e, "warm-up OPTIONS failed");
        }

        let setup_uri = setup_url(&base, &params);
        match self.rtsp.send(RtspMethod::Setup { transport_tcp }, &setup_uri) {
            Ok((status, _)) if status.is_success() => {
                let mut vars = self.vars.lock();
                vars.current_server = vars.next_server.clone();
                vars.last_base_url = base.clone();
                vars.last_params = params;
                vars.session_id = self.rtsp.session_id().unwrap_or_default();
                vars.stream_id = self.rtsp.stream_id().unwrap_or(0);
                vars.keep_alive_deadline = Instant::now() + self.timeout();
                if let Some(server) = &vars.current_server {
                    server.attach(self.device_id);
                }
                tracing::info!(device_id = self.device_id, %setup_uri, "fresh session established");
                Ok(())
            }
            Ok((status, _)) => {
                self.fail_connect();
                Err(SatipError::Transient(format!("SETUP returned {}", status.code)))
            }
            Err(e) => {
                self.fail_connect();
                Err(e)
            }
        }
    }

    fn current_quirks(&self, vars: &SessionVars) -> Option<crate::server::Quirks> {
        vars.current_server
            .as_ref()
            .or(vars.next_server.as_ref())
            .map(|s| s.quirks())
    }

    fn fail_connect(&self) {
        let mut vars = self.vars.lock();
        if self.config.disconnect_idle_streams {
            self.rtsp.close();
        } else {
            let _ = self.rtsp.reset();
        }
        vars.stream_id = -1;
        vars.session_id.clear();
    }

    fn timeout(&self) -> Duration {
        self.rtsp
            .session_timeout()
            .map(|t| self.config.keep_alive_interval(t))
            .unwrap_or(self.config.min_keep_alive)
    }

    /// Tear down a prior session, if any, then clear session state.
    pub fn disconnect(&self) -> Result<()> {
        let mut vars = self.vars.lock();
        if vars.stream_id >= 0 {
            let uri = stream_url(&vars.base_url, vars.stream_id, "");
            drop(vars);
            let _ = self.rtsp.send(RtspMethod::Teardown, &uri);
            vars = self.vars.lock();
        }

        if self.config.disconnect_idle_streams {
            self.rtsp.close();
        } else {
            let _ = self.rtsp.reset();
        }

        if let Some(server) = vars.current_server.take() {
            server.detach(self.device_id);
        }
        vars.stream_id = -1;
        vars.session_id.clear();
        vars.committed.clear();
        vars.pending_adds.clear();
        vars.pending_dels.clear();
        vars.reception_has_lock = false;
        vars.reception = None;
        Ok(())
    }

    /// Construct and (conditionally) issue the PLAY URI for pending PID
    /// deltas, the PlayPids quirk, and CI-extension parameters.
    pub fn update_pids(&self, force: bool) -> Result<bool> {
        let mut vars = self.vars.lock();

        let cache_expired = Instant::now() >= vars.pid_update_cache_deadline;
        let has_deltas = !vars.pending_adds.is_empty() || !vars.pending_dels.is_empty();
        let pmt_linger_expired = vars
            .pmt_pid_linger_deadline
            .is_some_and(|d| Instant::now() >= d);
        let pmt_active = !vars.pmt_pids.is_empty();

        let should_run = vars.stream_id >= 0
            && !vars.base_url.is_empty()
            && (force || (cache_expired && has_deltas) || (pmt_active && pmt_linger_expired));

        if !should_run {
            return Ok(false);
        }

        let quirks = self.current_quirks(&vars).unwrap_or(crate::server::Quirks::empty());
        let use_play_pids = force || quirks.contains(crate::server::Quirks::PLAY_PIDS);

        let mut fragments = Vec::new();
        if use_play_pids {
            let mut list = vars.committed.list_pids();
            if quirks.contains(crate::server::Quirks::PLAY_PIDS)
                && vars.committed.size() == 1
                && vars.committed.iter().next().is_some_and(|p| p < 0x20)
            {
                list = format!("{list},{}", self.config.dummy_pid);
            }
            fragments.push(format!("pids={list}"));
        } else {
            if !vars.pending_adds.is_empty() {
                fragments.push(format!("addpids={}", vars.pending_adds.list_pids()));
            }
            if !vars.pending_dels.is_empty() {
                fragments.push(format!("delpids={}", vars.pending_dels.list_pids()));
            }
        }

        let has_ci = vars
            .current_server
            .as_ref()
            .or(vars.next_server.as_ref())
            .is_some_and(|s| s.has_ci());

        if self.config.ci_extension_enabled && has_ci {
            if quirks.contains(crate::server::Quirks::CI_XPMT) {
                if pmt_linger_expired {
                    if let Some(last) = vars.pmt_pids.iter().last() {
                        let mut pruned = PidSet::new();
                        let _ = pruned.add_pid(last);
                        vars.pmt_pids = pruned;
                    }
                }
                if !vars.pmt_pids.is_empty() {
                    fragments.push(format!("x_pmt={}", vars.pmt_pids.list_pids()));
                }
            }
            if quirks.contains(crate::server::Quirks::CI_TNR) && vars.tnr_string != vars.last_tnr_string {
                fragments.push(format!("tnr={}", vars.tnr_string));
            }
            if let Some(slot) = vars.ci_slot {
                fragments.push(format!("x_ci={slot}"));
            }
        }

        let params = join_params(&fragments);
        if params.is_empty() {
            return Ok(false);
        }

        let uri = stream_url(&vars.base_url, vars.stream_id, &params);
        drop(vars);

        match self.rtsp.send(RtspMethod::Play, &uri) {
            Ok((status, _)) if status.is_success() => {
                let mut vars = self.vars.lock();
                vars.pid_update_cache_deadline = Instant::now() + self.config.pid_update_cache_interval;
                vars.pending_adds.clear();
                vars.pending_dels.clear();
                vars.last_tnr_string = vars.tnr_string.clone();
                tracing::debug!(device_id = self.device_id, %uri, "UpdatePids applied");
                Ok(true)
            }
            _ => Err(SatipError::Transient("UpdatePids PLAY failed".to_string())),
        }
    }

    /// Issue RTSP OPTIONS if the keep-alive deadline expired (or
    /// `force`) and the base URL is known.
    pub fn keep_alive(&self, force: bool) -> Result<()> {
        let (due, base_url) = {
            let vars = self.vars.lock();
            (
                force || Instant::now() >= vars.keep_alive_deadline,
                vars.base_url.clone(),
            )
        };
        if !due || base_url.is_empty() {
            return Ok(());
        }
        match self.rtsp.send(RtspMethod::Options, &base_url) {
            Ok((status, _)) if status.is_success() => {
                self.vars.lock().keep_alive_deadline = Instant::now() + self.timeout();
                Ok(())
            }
            _ => Err(SatipError::SessionExpired),
        }
    }

    /// Issue RTSP DESCRIBE if the status-update deadline expired (or
    /// `force`) and a stream id is known.
    pub fn read_reception_status(&self, force: bool) -> Result<()> {
        let (due, base_url, stream_id) = {
            let vars = self.vars.lock();
            (
                force || Instant::now() >= vars.status_update_deadline,
                vars.base_url.clone(),
                vars.stream_id,
            )
        };
        if !due || stream_id < 0 {
            return Ok(());
        }
        let uri = stream_url(&base_url, stream_id, "");
        let (_, body) = self.rtsp.send(RtspMethod::Describe, &uri)?;
        if let Some(status) = parse_tuner_status(&body) {
            self.apply_reception(status);
        }
        self.vars.lock().status_update_deadline = Instant::now() + self.config.status_update_interval;
        Ok(())
    }

    fn apply_reception(&self, status: crate::reception::ReceptionStatus) {
        let mut vars = self.vars.lock();
        vars.reception = Some(status);
        vars.reception_has_lock = status.has_lock;
        vars.connect_watchdog_deadline = Instant::now() + self.config.connect_watchdog;
    }

    /// Poll the RTSP connection for queued inbound data.
    pub fn receive(&self) {
        let _ = self.rtsp.poll_inbound();
    }

    /// Current reception status, if any has been observed.
    pub fn reception(&self) -> Option<crate::reception::ReceptionStatus> {
        self.vars.lock().reception
    }

    // ---- §4.5 state machine loop -------------------------------------

    /// Run one iteration of the state-machine loop: drain a pending
    /// transition if any (updating the current state), then dispatch
    /// on the (possibly just-updated) current state. `Tuned` and
    /// `Locked` are steady states whose periodic work (reception
    /// probes, keep-alive, idle checks) must keep running every pass
    /// even when no transition was queued, so dispatch is unconditional;
    /// the loop only sleeps on the wake event when this pass drained
    /// nothing, to avoid busy-spinning.
    pub fn step(&self) {
        let drained = self.state.drain_one();

        match self.state() {
            TunerState::Idle => {}
            TunerState::Release => self.run_release(),
            TunerState::Set => self.run_set(),
            TunerState::Tuned => self.run_tuned(drained == Some(TunerState::Tuned)),
            TunerState::Locked => self.run_locked(),
        }

        if drained.is_none() {
            self.state.wait(self.config.sleep_timeout);
        }
    }

    fn run_release(&self) {
        let _ = self.disconnect();
        self.state.request_state(TunerState::Idle, QueueKind::Internal);
    }

    fn run_set(&self) {
        let needs_reconnect = {
            let mut vars = self.vars.lock();
            // needs_reconnect is a one-shot trigger set by SetSource; consume
            // it here so a later Set pass (idle release, retune, ...) is not
            // forced to disconnect again for a reason that no longer holds.
            let requested = std::mem::take(&mut vars.needs_reconnect);
            requested
                || self
                    .current_quirks(&vars)
                    .is_some_and(|q| q.contains(crate::server::Quirks::TEAR_AND_PLAY))
        };
        if needs_reconnect {
            let _ = self.disconnect();
        }
        match self.connect() {
            Ok(()) => {
                self.vars.lock().tuning_watchdog_deadline =
                    Instant::now() + self.config.tuning_watchdog;
                self.state.request_state(TunerState::Tuned, QueueKind::Internal);
                let _ = self.update_pids(true);
            }
            Err(e) => {
                tracing::warn!(device_id = self.device_id, error = %e, "connect failed, remaining in Set");
                let _ = self.disconnect();
            }
        }
    }

    /// `entered` is true only on the pass that just drained the
    /// transition into `Tuned`; `on_tuned()` fires once per entry
    /// rather than on every pass of this steady-until-locked state.
    fn run_tuned(&self, entered: bool) {
        self.vars.lock().connect_watchdog_deadline = Instant::now() + self.config.connect_watchdog;
        if entered {
            self.consumer.on_tuned();
        }

        let force_lock = self
            .vars
            .lock()
            .current_server
            .as_ref()
            .is_some_and(|s| s.quirks().contains(crate::server::Quirks::FORCE_LOCK));

        if force_lock {
            self.apply_reception(crate::reception::ReceptionStatus {
                frontend_id: 0,
                signal_strength_dbm: -40.0,
                signal_strength: 80,
                has_lock: true,
                signal_quality: 80,
            });
        } else {
            let _ = self.read_reception_status(false);
        }

        let vars = self.vars.lock();
        let has_lock = vars.reception_has_lock;
        let tuning_expired = Instant::now() >= vars.tuning_watchdog_deadline;
        drop(vars);

        if has_lock {
            self.state.request_state(TunerState::Locked, QueueKind::Internal);
        } else if tuning_expired {
            self.state.request_state(TunerState::Set, QueueKind::Internal);
        }
    }

    fn run_locked(&self) {
        let mut retune = false;

        if self.update_pids(false).is_err() {
            retune = true;
        }
        if self.keep_alive(false).is_err() {
            retune = true;
        }
        self.receive();

        if Instant::now() >= self.vars.lock().connect_watchdog_deadline {
            retune = true;
        }

        if retune {
            self.state.request_state(TunerState::Set, QueueKind::Internal);
            return;
        }

        let due_idle_check = {
            let mut vars = self.vars.lock();
            let due = Instant::now() >= vars.idle_check_deadline;
            if due {
                vars.idle_check_deadline = Instant::now() + self.config.idle_check_interval;
            }
            due
        };

        if due_idle_check {
            if self.consumer.is_idle() {
                let mut vars = self.vars.lock();
                vars.consecutive_idle += 1;
                let release = vars.consecutive_idle >= 2;
                drop(vars);
                if release {
                    self.state.request_state(TunerState::Release, QueueKind::Internal);
                }
            } else {
                self.vars.lock().consecutive_idle = 0;
            }
        }
    }

    /// Spawn the engine loop thread. Mirrors the teacher's
    /// thread-per-connection model, here one thread per tuner (§5).
    pub fn start(self: &Arc<Self>) {
        self.running.store(true, Ordering::SeqCst);
        let engine = self.clone();
        thread::spawn(move || {
            tracing::info!(device_id = engine.device_id, "session engine started");
            while engine.running.load(Ordering::SeqCst) {
                engine.step();
            }
            tracing::info!(device_id = engine.device_id, "session engine loop exited");
        });
    }

    /// Signal the loop to stop. Per §5 cancellation semantics, a
    /// pending RTSP request in flight may be abandoned; the caller is
    /// responsible for joining any thread it spawned via [`Self::start`]
    /// with its own grace period.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.state.request_state(self.state.current(), QueueKind::Internal);
    }

    pub fn device_id(&self) -> DeviceId {
        self.device_id
    }
}

impl SessionCallbacks for SessionEngine {
    /// Raw RTP payload arrived on the engine's RTP socket; relay
    /// unmodified to the consumer (demuxing/decoding is out of scope).
    fn process_video_data(&self, data: &[u8]) {
        self.consumer.on_data(data);
    }

    /// An RTCP packet arrived. Any APP arrival refreshes the connect
    /// watchdog per §4.6, whether or not it carries a parseable SAT>IP
    /// `tuner=` tuple; a parseable tuple additionally updates reception
    /// status via the C7 parser.
    fn process_application_data(&self, data: &[u8]) {
        self.vars.lock().connect_watchdog_deadline = Instant::now() + self.config.connect_watchdog;
        if let Some(status) = parse_tuner_status(data) {
            self.apply_reception(status);
        }
    }
}
