//! Per-server compatibility quirk bitset.
//!
//! Quirks are derived once, by substring match against a server's
//! description string, at [`super::ServerRecord`] construction time —
//! never re-evaluated, since descriptions are immutable per record.

bitflags::bitflags! {
    /// Eight-bit enumeration of protocol-usage quirks a server may need.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Quirks: u8 {
        const SESSION_ID    = 0b0000_0001;
        const PLAY_PIDS     = 0b0000_0010;
        const FORCE_LOCK    = 0b0000_0100;
        const RTP_OVER_TCP  = 0b0000_1000;
        const CI_XPMT       = 0b0001_0000;
        const CI_TNR        = 0b0010_0000;
        const FORCE_PILOT   = 0b0100_0000;
        const TEAR_AND_PLAY = 0b1000_0000;
    }
}

/// `(bit, triggering substrings)` table, checked against a server's
/// description at construction. Any one match sets the bit.
const QUIRK_TABLE: &[(Quirks, &[&str])] = &[
    (
        Quirks::SESSION_ID,
        &["GSSBOX", "DIGIBIT", "Multibox-", "Triax SatIP Converter"],
    ),
    (
        Quirks::PLAY_PIDS,
        &["FRITZ!WLAN Repeater DVB-C", "fritzdvbc"],
    ),
    (
        Quirks::FORCE_LOCK,
        &[
            "FRITZ!WLAN Repeater DVB-C",
            "fritzdvbc",
            "Schwaiger Sat>IP Server",
        ],
    ),
    (Quirks::RTP_OVER_TCP, &["minisatip", "DVBViewer"]),
    (Quirks::CI_XPMT, &["OctopusNet", "minisatip"]),
    (Quirks::CI_TNR, &["DVBViewer"]),
    (
        Quirks::FORCE_PILOT,
        &[
            "GSSBOX",
            "DIGIBIT",
            "Multibox-",
            "Triax SatIP Converter",
            "KATHREIN SatIP Server",
        ],
    ),
    (
        Quirks::TEAR_AND_PLAY,
        &["FRITZ!WLAN Repeater DVB-C", "fritzdvbc"],
    ),
];

/// Allow-list of servers known to support the external CI extension.
/// Unlike [`QUIRK_TABLE`], this is never gated by a quirk-disable flag.
const HAS_CI_ALLOWLIST: &[&str] = &["OctopusNet", "minisatip", "DVBViewer"];

/// Evaluate the quirk table against `description`. When
/// `disable_server_quirks` is true, every bit is cleared regardless of
/// substring matches.
pub fn derive_quirks(description: &str, disable_server_quirks: bool) -> Quirks {
    if disable_server_quirks {
        return Quirks::empty();
    }
    let mut bits = Quirks::empty();
    for (bit, patterns) in QUIRK_TABLE {
        if patterns.iter().any(|p| description.contains(p)) {
            bits |= *bit;
        }
    }
    bits
}

/// Whether `description` matches the (always-on) CI support allow-list.
pub fn has_ci(description: &str) -> bool {
    HAS_CI_ALLOWLIST.iter().any(|p| description.contains(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gssbox_gets_session_id_and_force_pilot() {
        let q = derive_quirks("GSSBOX SAT>IP Server", false);
        assert!(q.contains(Quirks::SESSION_ID));
        assert!(q.contains(Quirks::FORCE_PILOT));
        assert!(!q.contains(Quirks::PLAY_PIDS));
    }

    #[test]
    fn fritz_gets_playpids_forcelock_tearandplay() {
        let q = derive_quirks("FRITZ!WLAN Repeater DVB-C", false);
        assert!(q.contains(Quirks::PLAY_PIDS));
        assert!(q.contains(Quirks::FORCE_LOCK));
        assert!(q.contains(Quirks::TEAR_AND_PLAY));
        assert!(!q.contains(Quirks::SESSION_ID));
    }

    #[test]
    fn disable_quirks_clears_all_bits() {
        let q = derive_quirks("GSSBOX SAT>IP Server", true);
        assert!(q.is_empty());
    }

    #[test]
    fn has_ci_is_independent_of_disable_flag() {
        assert!(has_ci("minisatip 1.2.3"));
        assert!(!has_ci("GSSBOX SAT>IP Server"));
    }

    #[test]
    fn minisatip_has_rtp_over_tcp_and_ci_xpmt() {
        let q = derive_quirks("minisatip 1.0", false);
        assert!(q.contains(Quirks::RTP_OVER_TCP));
        assert!(q.contains(Quirks::CI_XPMT));
        assert!(!q.contains(Quirks::CI_TNR));
    }

    #[test]
    fn dvbviewer_has_ci_tnr_and_rtp_over_tcp() {
        let q = derive_quirks("DVBViewer Media Server", false);
        assert!(q.contains(Quirks::CI_TNR));
        assert!(q.contains(Quirks::RTP_OVER_TCP));
        assert!(!q.contains(Quirks::CI_XPMT));
    }
}
