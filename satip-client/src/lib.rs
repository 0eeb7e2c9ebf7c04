//! SAT>IP tuner client: RTSP/RTP session engine and server registry.
//!
//! This crate implements the client half of the SAT>IP protocol
//! (ETSI TS 102 034-ish de facto spec used by satellite/terrestrial/
//! cable/ATSC IP tuners): it drives an RTSP control channel and a
//! paired RTP/RTCP media channel to acquire, hold, and release a
//! streamed DVB transponder, and it catalogues the servers a discovery
//! layer finds along with their frontend capacities and protocol
//! quirks.
//!
//! ## Architecture
//!
//! ```text
//! Discovery (external) ──▶ ServerRegistry ──▶ ServerRecord ──▶ FrontendPool
//!                                 │                  │
//!                                 ▼                  ▼
//!                           SessionEngine ◀── StateMachine (Idle/Release/Set/Tuned/Locked)
//!                                 │
//!                  ┌──────────────┼──────────────┐
//!                  ▼              ▼              ▼
//!           RtspConnection   RtpReceiver    RtcpReceiver ──▶ ReceptionStatus (C7)
//!             (external)      (external)      (external)
//! ```
//!
//! The RTSP wire codec, the UPnP/SSDP crawler, the raw RTP/RTCP
//! receivers, the transport-stream consumer, the readiness poller, and
//! the plugin configuration source are not implemented in this crate —
//! see [`collaborators`] for the trait boundaries an embedding
//! application fills in.
//!
//! ## Quick start
//!
//! ```
//! use std::sync::Arc;
//! use satip::registry::ServerRegistry;
//! use satip::server::ServerRecord;
//!
//! let registry = ServerRegistry::new();
//! let record = ServerRecord::new(
//!     None,
//!     "192.168.1.50".to_string(),
//!     554,
//!     "DVBS2-2,DVBT-1",
//!     "",
//!     "Generic SAT>IP Server".to_string(),
//!     false,
//! );
//! let record = registry.insert(record);
//! assert!(record.matches("S19.2E"));
//! ```

pub mod collaborators;
pub mod config;
pub mod error;
pub mod frontend;
pub mod pid;
pub mod reception;
pub mod registry;
pub mod server;
pub mod session;
pub mod socket;
pub mod state;
pub mod url;

pub use config::TunerConfig;
pub use error::{Result, SatipError};
pub use reception::ReceptionStatus;
pub use registry::ServerRegistry;
pub use server::ServerRecord;
pub use session::SessionEngine;
pub use state::TunerState;
