//! Session variables (§3): everything the engine mutex protects.

use std::sync::Arc;
use std::time::Instant;

use crate::pid::PidSet;
use crate::reception::ReceptionStatus;
use crate::server::ServerRecord;

/// All mutable per-session state, held behind the engine's single
/// mutex (§5 Locking).
pub struct SessionVars {
    pub current_server: Option<Arc<ServerRecord>>,
    pub next_server: Option<Arc<ServerRecord>>,
    pub transponder: u32,

    pub base_url: String,
    pub last_base_url: String,
    pub params: String,
    pub last_params: String,

    pub session_id: String,
    /// -1 when no stream is held.
    pub stream_id: i64,

    pub pending_adds: PidSet,
    pub pending_dels: PidSet,
    pub committed: PidSet,

    pub pmt_pids: PidSet,
    pub pmt_pid_linger_deadline: Option<Instant>,
    pub ci_slot: Option<u16>,
    pub tnr_string: String,
    pub last_tnr_string: String,

    pub needs_reconnect: bool,

    pub keep_alive_deadline: Instant,
    pub connect_watchdog_deadline: Instant,
    pub tuning_watchdog_deadline: Instant,
    pub pid_update_cache_deadline: Instant,
    pub setup_watchdog_deadline: Instant,
    pub status_update_deadline: Instant,
    pub idle_check_deadline: Instant,

    pub reception: Option<ReceptionStatus>,
    pub reception_has_lock: bool,
    pub consecutive_idle: u32,
}

impl SessionVars {
    pub fn new() -> Self {
        let now = Instant::now();
        SessionVars {
            current_server: None,
            next_server: None,
            transponder: 0,
            base_url: String::new(),
            last_base_url: String::new(),
            params: String::new(),
            last_params: String::new(),
            session_id: String::new(),
            stream_id: -1,
            pending_adds: PidSet::new(),
            pending_dels: PidSet::new(),
            committed: PidSet::new(),
            pmt_pids: PidSet::new(),
            pmt_pid_linger_deadline: None,
            ci_slot: None,
            tnr_string: String::new(),
            last_tnr_string: String::new(),
            needs_reconnect: false,
            keep_alive_deadline: now,
            connect_watchdog_deadline: now,
            tuning_watchdog_deadline: now,
            pid_update_cache_deadline: now,
            setup_watchdog_deadline: now,
            status_update_deadline: now,
            idle_check_deadline: now,
            reception: None,
            reception_has_lock: false,
            consecutive_idle: 0,
        }
    }
}

impl Default for SessionVars {
    fn default() -> Self {
        Self::new()
    }
}
