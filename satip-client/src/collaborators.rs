//! Abstract interfaces over the subsystems §1 places out of scope.
//!
//! Everything in this module is a seam, not an implementation: the
//! RTSP wire codec, the UPnP/SSDP crawler, the raw RTP/RTCP socket
//! receivers, the transport-stream consumer, the readiness poller, and
//! the plugin configuration façade are each owned by the embedding
//! application. The engine only ever reaches them through these
//! traits.

use std::sync::Arc;

use crate::error::Result;
use crate::server::ServerRecord;

/// RTSP status line, reduced to the bit the engine actually branches
/// on. The wire-level reason phrase and header set are the
/// collaborator's concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtspStatus {
    pub code: u16,
}

impl RtspStatus {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }
}

/// The RTSP method being issued. Carries just what the engine needs to
/// decide; request-line/header construction and CSeq bookkeeping are
/// the collaborator's job.
#[derive(Debug, Clone)]
pub enum RtspMethod {
    Options,
    Setup { transport_tcp: bool },
    Play,
    Describe,
    Teardown,
}

/// One RTSP session's control channel. Implementations own the socket,
/// the line parser/serializer, and CSeq/session-id bookkeeping.
pub trait RtspConnection: Send + Sync {
    /// Bind the control interface to `addr` before opening a fresh
    /// session, when the target server declares a preferred source
    /// address. `None` leaves the interface choice to the collaborator.
    /// Default no-op for collaborators that don't support source
    /// binding (e.g. a single-homed host).
    fn bind_source_address(&self, _addr: Option<&str>) -> Result<()> {
        Ok(())
    }

    /// Issue `method` against `uri`, returning the response status (and,
    /// for DESCRIBE, the response body so the caller can extract an
    /// RTCP-APP-carried reception update per §4.6).
    fn send(&self, method: RtspMethod, uri: &str) -> Result<(RtspStatus, Vec<u8>)>;

    /// Drain any inbound data queued by the server since the last call
    /// (server-initiated messages, or simply keeping a TCP half alive).
    fn poll_inbound(&self) -> Option<Vec<u8>>;

    /// Re-establish the connection in place, keeping the same session
    /// identity where the server allows it.
    fn reset(&self) -> Result<()>;

    /// Tear the connection down entirely.
    fn close(&self);

    /// Server-announced RTSP session timeout, once known (after SETUP).
    fn session_timeout(&self) -> Option<std::time::Duration>;

    /// Server-assigned RTSP `Session` identifier, once known (after
    /// SETUP). The engine stores this for diagnostics; the collaborator
    /// remains the one that attaches it to outgoing request headers.
    fn session_id(&self) -> Option<String> {
        None
    }

    /// Server-assigned SAT>IP stream id, parsed by the collaborator out
    /// of the SETUP response (the `stream=<id>` component of the
    /// returned session URL / `com.ses.streamID` header). The engine
    /// stores this and addresses all subsequent PLAY/DESCRIBE/TEARDOWN
    /// requests at `base/stream=<id>` (§6).
    fn stream_id(&self) -> Option<i64> {
        None
    }
}

/// Registration token returned by [`Poller::register`]; deregistration
/// takes the same token back. Opaque to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollToken(pub u64);

/// The readiness poller RTP/RTCP sockets register with. The concrete
/// reactor (epoll/kqueue/IOCP/...) lives entirely behind this trait.
pub trait Poller: Send + Sync {
    fn register(&self) -> PollToken;
    fn deregister(&self, token: PollToken);
}

/// Delivers bytes received on the RTP socket. Demuxing and decoding are
/// both out of scope; the engine only relays.
pub trait RtpReceiver: Send + Sync {
    fn local_port(&self) -> u16;
}

/// Delivers RTCP packets (including the SAT>IP `SES1` APP payload the
/// reception parser, C7, consumes).
pub trait RtcpReceiver: Send + Sync {
    fn local_port(&self) -> u16;
}

/// Callbacks the engine implements so RTP/RTCP receivers can hand it
/// data without the engine depending on their concrete socket type.
pub trait SessionCallbacks: Send + Sync {
    /// Raw RTP payload arrived; relay to the consumer unmodified.
    fn process_video_data(&self, data: &[u8]);

    /// An RTCP packet arrived; if it carries a SAT>IP APP payload, the
    /// engine parses it with C7 and refreshes the connect watchdog.
    fn process_application_data(&self, data: &[u8]);
}

/// The transport-stream consumer downstream of the engine.
pub trait StreamConsumer: Send + Sync {
    /// True if the consumer has not requested data recently; gates the
    /// two-consecutive-observations idle-release rule of §4.5.
    fn is_idle(&self) -> bool;

    /// Called once when the state machine reaches `Tuned`.
    fn on_tuned(&self);

    /// Raw relayed RTP payload.
    fn on_data(&self, data: &[u8]);
}

/// Read-only accessor over the embedding application's configuration
/// store, so the engine never depends on a concrete config source.
pub trait PluginConfig: Send + Sync {
    fn tuner_config(&self) -> Arc<crate::config::TunerConfig>;
}

/// The UPnP/SSDP discovery crawler boundary. The registry (C3) consumes
/// its output but does not implement discovery itself.
pub trait Discovery: Send + Sync {
    fn known_servers(&self) -> Vec<Arc<ServerRecord>>;
}
