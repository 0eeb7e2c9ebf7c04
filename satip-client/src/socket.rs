//! RTP/RTCP socket-pair acquisition (§4.6 "Socket acquisition").
//!
//! Binding a real UDP socket pair is in scope even though the raw
//! packet receivers built on top of them are not (§1) — this mirrors
//! the teacher's `transport::udp::UdpTransport::bind`, just applied to
//! an even/odd adjacent pair instead of a single listener.

use std::net::{SocketAddr, UdpSocket};

use crate::config::PortRange;
use crate::error::{Result, SatipError};

/// A bound RTP/RTCP socket pair: RTP always on the even port, RTCP on
/// the next (odd) one.
pub struct SocketPair {
    pub rtp: UdpSocket,
    pub rtcp: UdpSocket,
}

/// Try binding an even/odd pair at `port` on `bind_addr`. Fails if
/// `port` is odd, or either bind fails (most commonly: already in use).
fn try_bind_pair(bind_addr: std::net::IpAddr, port: u16) -> Result<SocketPair> {
    if port % 2 != 0 {
        return Err(SatipError::Fatal(format!("rejected odd RTP port {port}")));
    }
    let rtp_addr = SocketAddr::new(bind_addr, port);
    let rtcp_addr = SocketAddr::new(bind_addr, port + 1);
    let rtp = UdpSocket::bind(rtp_addr)?;
    let rtcp = UdpSocket::bind(rtcp_addr)?;
    Ok(SocketPair { rtp, rtcp })
}

/// Acquire an RTP/RTCP socket pair. If `port_range` is given, tries
/// consecutive even ports within `[start, end]` (step 2). Otherwise
/// attempts up to 100 kernel-assigned ("ephemeral") pairs, rejecting
/// any odd RTP port the kernel happens to hand back.
///
/// Returns [`SatipError::Fatal`] if no pair could be acquired — per
/// §7, this is the one error kind that is not locally retried by the
/// state machine; the engine is constructed but every subsequent
/// `Connect` will fail.
pub fn acquire_rtp_rtcp_sockets(
    bind_addr: std::net::IpAddr,
    port_range: Option<PortRange>,
) -> Result<SocketPair> {
    match port_range {
        Some(range) => {
            let mut port = range.start - (range.start % 2);
            while port < range.end {
                if let Ok(pair) = try_bind_pair(bind_addr, port) {
                    return Ok(pair);
                }
                port += 2;
            }
            Err(SatipError::Fatal(format!(
                "no free even/odd port pair in range {}..{}",
                range.start, range.end
            )))
        }
        None => {
            for _ in 0..100 {
                // Bind RTP to an ephemeral port, then try to claim the
                // very next port for RTCP; reject if the kernel handed
                // us an odd RTP port.
                let rtp = UdpSocket::bind(SocketAddr::new(bind_addr, 0))?;
                let rtp_port = rtp.local_addr()?.port();
                if rtp_port % 2 != 0 {
                    continue;
                }
                if let Ok(rtcp) = UdpSocket::bind(SocketAddr::new(bind_addr, rtp_port + 1)) {
                    return Ok(SocketPair { rtp, rtcp });
                }
            }
            Err(SatipError::Fatal(
                "exhausted 100 ephemeral port attempts".to_string(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn ephemeral_pair_has_even_rtp_and_adjacent_rtcp() {
        let pair = acquire_rtp_rtcp_sockets(Ipv4Addr::LOCALHOST.into(), None)
            .expect("should acquire a pair");
        let rtp_port = pair.rtp.local_addr().unwrap().port();
        let rtcp_port = pair.rtcp.local_addr().unwrap().port();
        assert_eq!(rtp_port % 2, 0);
        assert_eq!(rtcp_port, rtp_port + 1);
    }

    #[test]
    fn rejects_odd_start_of_range_by_rounding_down() {
        // A range starting odd should still only ever try even ports.
        let range = PortRange {
            start: 40001,
            end: 40010,
        };
        let pair = acquire_rtp_rtcp_sockets(Ipv4Addr::LOCALHOST.into(), Some(range))
            .expect("should acquire a pair in range");
        let rtp_port = pair.rtp.local_addr().unwrap().port();
        assert_eq!(rtp_port % 2, 0);
        assert!(rtp_port >= 40000 && rtp_port < 40010);
    }
}
