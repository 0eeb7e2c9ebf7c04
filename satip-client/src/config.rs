//! Configuration surface consumed by the session engine (§6) and its
//! tuning-constant defaults.

use std::time::Duration;

/// How the engine should carry media: plain UDP, multicast, or
/// interleaved over the RTSP TCP connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    Unicast,
    Multicast,
    RtpOverTcp,
}

/// A `start..=end` even-port range the engine should try when opening
/// its RTP/RTCP socket pair, stepping by 2. `None` means "ask the
/// kernel for an ephemeral pair".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

/// Read-only configuration the engine consults. An embedding
/// application constructs this (directly, or via a [`crate::collaborators::PluginConfig`]
/// implementation backed by its own settings store); this crate never
/// reads or writes persistent configuration itself.
#[derive(Debug, Clone)]
pub struct TunerConfig {
    pub port_range: Option<PortRange>,
    pub transport_mode: TransportMode,
    pub ci_extension_enabled: bool,
    pub disable_server_quirks: bool,
    pub disconnect_idle_streams: bool,
    pub single_model_servers: bool,
    pub rtp_receive_buffer_bytes: usize,
    pub disabled_sources: Vec<String>,
    pub disabled_filters: Vec<String>,
    pub ci_slot_assignments: Vec<(u32, u16)>,

    pub min_keep_alive: Duration,
    pub keep_alive_pre_buffer: Duration,
    pub connect_watchdog: Duration,
    pub tuning_watchdog: Duration,
    pub idle_check_interval: Duration,
    pub sleep_timeout: Duration,
    pub pid_update_cache_interval: Duration,
    pub pmt_linger: Duration,
    pub setup_timeout: Duration,
    pub status_update_interval: Duration,
    pub dummy_pid: u16,
}

impl Default for TunerConfig {
    fn default() -> Self {
        TunerConfig {
            port_range: None,
            transport_mode: TransportMode::Unicast,
            ci_extension_enabled: false,
            disable_server_quirks: false,
            disconnect_idle_streams: false,
            single_model_servers: false,
            rtp_receive_buffer_bytes: 1 << 20,
            disabled_sources: Vec::new(),
            disabled_filters: Vec::new(),
            ci_slot_assignments: Vec::new(),

            min_keep_alive: Duration::from_millis(30_000),
            keep_alive_pre_buffer: Duration::from_millis(5_000),
            connect_watchdog: Duration::from_millis(5_000),
            tuning_watchdog: Duration::from_millis(4_000),
            idle_check_interval: Duration::from_millis(15_000),
            sleep_timeout: Duration::from_millis(1_000),
            pid_update_cache_interval: Duration::from_millis(200),
            pmt_linger: Duration::from_millis(2_000),
            setup_timeout: Duration::from_millis(5_000),
            status_update_interval: Duration::from_millis(2_000),
            dummy_pid: 0x1FFF,
        }
    }
}

impl TunerConfig {
    /// Keep-alive deadline derived from the server-announced session
    /// timeout minus the pre-buffer margin, floored at
    /// `min_keep_alive`.
    pub fn keep_alive_interval(&self, server_timeout: Duration) -> Duration {
        server_timeout
            .checked_sub(self.keep_alive_pre_buffer)
            .unwrap_or(Duration::ZERO)
            .max(self.min_keep_alive)
    }
}
