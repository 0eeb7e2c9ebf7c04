//! Crate-wide error type.
//!
//! Mirrors the error kinds of the tuner session engine: most are
//! recoverable and handled by the state machine itself (§7), so callers
//! mostly see [`SatipError::Fatal`] escape out of constructors while
//! everything else is logged and absorbed internally.

use std::fmt;

/// Result alias used throughout this crate.
pub type Result<T> = std::result::Result<T, SatipError>;

/// Errors surfaced by the session engine, state machine, and registry.
#[derive(Debug, thiserror::Error)]
pub enum SatipError {
    /// A single RTSP method (SETUP/PLAY/OPTIONS/...) failed. Recoverable:
    /// the state machine drops back to `Set` and retunes.
    #[error("transient RTSP failure: {0}")]
    Transient(String),

    /// The RTSP session expired (a keep-alive OPTIONS failed). Handled
    /// the same way as `Transient`.
    #[error("session expired")]
    SessionExpired,

    /// No lock was acquired within the tuning watchdog.
    #[error("tuning timed out after {0:?}")]
    TuningTimeout(std::time::Duration),

    /// The connect watchdog fired before a session could be established.
    #[error("connect timed out after {0:?}")]
    ConnectTimeout(std::time::Duration),

    /// The consumer reported idle twice in a row; not a failure, but
    /// modeled as an error kind per §7 so state-machine dispatch is
    /// uniform.
    #[error("consumer idle")]
    Idle,

    /// The RTP/RTCP socket pair could not be opened at construction.
    /// Unrecoverable: the engine remains alive but every `Connect` will
    /// fail until the process is restarted.
    #[error("fatal: could not acquire RTP/RTCP socket pair: {0}")]
    Fatal(String),

    /// Socket or I/O failure surfaced from a collaborator.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A malformed RTCP APP payload that could not be parsed by the
    /// reception parser (C7).
    #[error("malformed reception payload: {0}")]
    MalformedReception(String),
}

impl SatipError {
    /// True for the error kinds §7 handles by retuning (dropping to
    /// `Set`), as opposed to `Idle` (release) or `Fatal` (no recovery).
    pub fn triggers_retune(&self) -> bool {
        matches!(
            self,
            SatipError::Transient(_)
                | SatipError::SessionExpired
                | SatipError::TuningTimeout(_)
                | SatipError::ConnectTimeout(_)
        )
    }
}

/// A parsed 13-bit MPEG-TS PID out of range is reported through this
/// lightweight kind rather than `SatipError`, since it is a caller
/// programming error rather than a runtime condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PidOutOfRange(pub u16);

impl fmt::Display for PidOutOfRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PID {:#06x} exceeds 13-bit range", self.0)
    }
}

impl std::error::Error for PidOutOfRange {}
