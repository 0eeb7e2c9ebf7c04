//! Immutable description of one SAT>IP server plus derived quirk bits,
//! frontend pools, and source filters (C2).

pub mod quirks;

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use parking_lot::Mutex;

use crate::frontend::{FrontendKind, FrontendPool};
pub use quirks::Quirks;

/// One parsed `<Family>-<capacity>` token from a server's model string,
/// e.g. `DVBS2-2`.
fn parse_model_token(token: &str) -> Option<(FrontendKind, usize)> {
    let (family, rest) = token.split_once('-')?;
    let capacity: usize = rest.trim().parse().ok()?;
    let kind = match family.trim() {
        "DVBS2" => FrontendKind::DvbS2,
        "DVBT" => FrontendKind::DvbT,
        "DVBT2" => FrontendKind::DvbT2,
        "DVBC" => FrontendKind::DvbC,
        "DVBC2" => FrontendKind::DvbC2,
        "ATSC" => FrontendKind::Atsc,
        _ => return None,
    };
    Some((kind, capacity))
}

/// Weight applied to each frontend kind's pool capacity when computing
/// [`ServerRecord::num_provided_systems`]. UI-only metric.
fn system_weight(kind: FrontendKind) -> usize {
    match kind {
        FrontendKind::DvbS2 => 4,
        FrontendKind::DvbT => 3,
        FrontendKind::DvbT2 => 4,
        FrontendKind::DvbC => 3,
        FrontendKind::DvbC2 => 5,
        FrontendKind::Atsc => 3,
    }
}

/// Source-type family letter used in SAT>IP `src=` tokens and in
/// [`ServerRecord::assign`] dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFamily {
    Satellite,
    Terrestrial,
    Cable,
    Atsc,
}

fn family_of(src: &str) -> Option<SourceFamily> {
    match src.trim().chars().next()? {
        'S' | 's' => Some(SourceFamily::Satellite),
        'T' | 't' => Some(SourceFamily::Terrestrial),
        'C' | 'c' => Some(SourceFamily::Cable),
        'A' | 'a' => Some(SourceFamily::Atsc),
        _ => None,
    }
}

/// Immutable description of one SAT>IP server plus the mutable state
/// the registry and engine maintain over its lifetime.
///
/// Identity for registry dedup is the case-insensitive tuple
/// `(address, model, description)`; `Eq`/`Hash` are intentionally not
/// derived here because callers should compare through
/// [`ServerRecord::identity`] to get the case-folding right.
#[derive(Debug)]
pub struct ServerRecord {
    source_address: Option<String>,
    address: String,
    rtsp_port: u16,
    model: String,
    filters: Vec<String>,
    description: String,
    created_at: Instant,

    last_seen: Mutex<Instant>,
    active: AtomicBool,
    quirks: Quirks,
    has_ci: bool,
    pools: Mutex<Vec<FrontendPool>>,
}

impl ServerRecord {
    /// Construct a record, parsing `model` into frontend pools and
    /// `filters` into a canonical source-filter list, and deriving the
    /// quirk bitset from `description`.
    pub fn new(
        source_address: Option<String>,
        address: String,
        rtsp_port: u16,
        model: &str,
        filters: &str,
        description: String,
        disable_server_quirks: bool,
    ) -> Self {
        let mut pools = Vec::new();
        for token in model.split(',') {
            if let Some((kind, capacity)) = parse_model_token(token) {
                pools.push(FrontendPool::init(kind, capacity));
            }
        }

        let filters: Vec<String> = filters
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        let quirks = quirks::derive_quirks(&description, disable_server_quirks);
        let has_ci = quirks::has_ci(&description);

        tracing::debug!(
            address = %address,
            model,
            quirks = ?quirks,
            has_ci,
            "server record constructed"
        );

        ServerRecord {
            source_address,
            address,
            rtsp_port,
            model: model.to_string(),
            filters,
            description,
            created_at: Instant::now(),
            last_seen: Mutex::new(Instant::now()),
            active: AtomicBool::new(true),
            quirks,
            has_ci,
            pools: Mutex::new(pools),
        }
    }

    /// Case-insensitive identity tuple used for registry dedup.
    pub fn identity(&self) -> (String, String, String) {
        (
            self.address.to_lowercase(),
            self.model.to_lowercase(),
            self.description.to_lowercase(),
        )
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn source_address(&self) -> Option<&str> {
        self.source_address.as_deref()
    }

    pub fn rtsp_port(&self) -> u16 {
        self.rtsp_port
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn quirks(&self) -> Quirks {
        self.quirks
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn last_seen(&self) -> Instant {
        *self.last_seen.lock()
    }

    pub fn touch(&self) {
        *self.last_seen.lock() = Instant::now();
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Release);
    }

    /// True iff the filter list is empty (all sources accepted) or
    /// `src` is a member of it.
    pub fn is_valid_source(&self, src: &str) -> bool {
        self.filters.is_empty() || self.filters.iter().any(|f| f.eq_ignore_ascii_case(src))
    }

    /// True iff the description matches the (always-on) CI allow-list.
    pub fn has_ci(&self) -> bool {
        self.has_ci
    }

    /// Weighted sum of pool capacities; a UI-only metric, not used for
    /// allocation decisions.
    pub fn num_provided_systems(&self) -> usize {
        self.pools
            .lock()
            .iter()
            .map(|p| p.count() * system_weight(p.kind()))
            .sum()
    }

    fn kinds_for(&self, family: SourceFamily, system: u8) -> Vec<FrontendKind> {
        match family {
            SourceFamily::Satellite => vec![FrontendKind::DvbS2],
            SourceFamily::Terrestrial => {
                if system == 0 {
                    vec![FrontendKind::DvbT, FrontendKind::DvbT2]
                } else {
                    vec![FrontendKind::DvbT2]
                }
            }
            SourceFamily::Cable => {
                if system == 0 {
                    vec![FrontendKind::DvbC, FrontendKind::DvbC2]
                } else {
                    vec![FrontendKind::DvbC2]
                }
            }
            SourceFamily::Atsc => vec![FrontendKind::Atsc],
        }
    }

    /// Try to assign `device_id` a frontend slot compatible with `src`
    /// and `system`. Dispatches by source family letter; for
    /// terrestrial/cable, `system == 0` allows falling back between the
    /// first- and second-generation pool in that order, while
    /// `system != 0` forces the second-generation pool only.
    pub fn assign(&self, device_id: u32, src: &str, system: u8) -> bool {
        if !self.is_valid_source(src) {
            return false;
        }
        let Some(family) = family_of(src) else {
            return false;
        };
        let mut pools = self.pools.lock();
        // Invariant (a): a device-id occupies at most one slot across
        // *all* pools of this server. An already-assigned device is
        // idempotently reported as assigned regardless of which family
        // this call targets, rather than let it take a second slot in
        // a different pool.
        if pools.iter().any(|p| p.is_assigned(device_id)) {
            return true;
        }
        for kind in self.kinds_for(family, system) {
            if let Some(pool) = pools.iter_mut().find(|p| p.kind() == kind) {
                if pool.assign(device_id) {
                    return true;
                }
            }
        }
        false
    }

    /// Same decision as [`Self::assign`] without allocating a slot.
    pub fn matches(&self, src: &str) -> bool {
        if !self.is_valid_source(src) {
            return false;
        }
        let Some(family) = family_of(src) else {
            return false;
        };
        let pools = self.pools.lock();
        self.kinds_for(family, 0)
            .iter()
            .chain(self.kinds_for(family, 1).iter())
            .any(|kind| pools.iter().any(|p| p.kind() == *kind))
    }

    pub fn attach(&self, device_id: u32) -> bool {
        self.pools.lock().iter_mut().any(|p| p.attach(device_id))
    }

    pub fn detach(&self, device_id: u32) -> bool {
        self.pools.lock().iter_mut().any(|p| p.detach(device_id))
    }

    /// Server-identity string for catalogue listing: `"<address>|<model>|<description>"`,
    /// optionally prefixed with `<srcAddress>@`.
    pub fn identity_string(&self) -> String {
        match &self.source_address {
            Some(src) => format!("{src}@{}|{}|{}", self.address, self.model, self.description),
            None => format!("{}|{}|{}", self.address, self.model, self.description),
        }
    }

    /// Base RTSP URL, `rtsp://<addr>[:<port>]/` — port omitted when 554.
    pub fn base_url(&self) -> String {
        if self.rtsp_port == 554 {
            format!("rtsp://{}/", self.address)
        } else {
            format!("rtsp://{}:{}/", self.address, self.rtsp_port)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(model: &str, description: &str) -> ServerRecord {
        ServerRecord::new(
            None,
            "192.168.1.50".to_string(),
            554,
            model,
            "",
            description.to_string(),
            false,
        )
    }

    #[test]
    fn capacity_parsing_matches_spec_example() {
        let s = record("DVBS2-2,DVBT-1", "generic");
        assert_eq!(s.num_provided_systems(), 2 * 4 + 1 * 3);
    }

    #[test]
    fn unrecognized_tokens_are_ignored() {
        let s = record("DVBS2-2,BOGUS-9", "generic");
        assert_eq!(s.num_provided_systems(), 2 * 4);
    }

    #[test]
    fn assign_respects_empty_filter_as_accept_all() {
        let s = record("DVBS2-1", "generic");
        assert!(s.is_valid_source("S19.2E"));
        assert!(s.assign(1, "S19.2E", 0));
    }

    #[test]
    fn filters_restrict_sources() {
        let s = ServerRecord::new(
            None,
            "192.168.1.50".to_string(),
            554,
            "DVBS2-1",
            "S19.2E",
            "generic".to_string(),
            false,
        );
        assert!(s.is_valid_source("S19.2E"));
        assert!(!s.is_valid_source("S13.0E"));
    }

    #[test]
    fn terrestrial_falls_back_between_t_and_t2_when_system_unspecified() {
        let s = record("DVBT2-1", "generic");
        assert!(s.assign(1, "T", 0));
    }

    #[test]
    fn terrestrial_forces_t2_when_system_specified() {
        let s = record("DVBT-1", "generic");
        assert!(!s.assign(1, "T", 1));
    }

    #[test]
    fn device_appears_in_at_most_one_pool() {
        let s = record("DVBS2-2", "generic");
        assert!(s.assign(7, "S19.2E", 0));
        // re-assigning the same device must not consume a second slot
        assert!(s.assign(7, "S19.2E", 0));
        assert!(s.assign(8, "S19.2E", 0));
        assert!(!s.assign(9, "S19.2E", 0));
    }

    #[test]
    fn device_cannot_hold_slots_in_two_different_pools() {
        let s = record("DVBS2-2,DVBT-2", "generic");
        assert!(s.assign(1, "S19.2E", 0));
        // same device, different family: must not take a second, distinct-kind slot
        assert!(s.assign(1, "T", 0));
        assert!(s.detach(1));
        // after detach it is free to take a slot in either family again
        assert!(s.assign(1, "T", 0));
    }

    #[test]
    fn has_ci_matches_allowlist() {
        assert!(record("DVBS2-1", "minisatip 1.0").has_ci());
        assert!(!record("DVBS2-1", "GSSBOX").has_ci());
    }

    #[test]
    fn base_url_omits_default_port() {
        let s = record("DVBS2-1", "generic");
        assert_eq!(s.base_url(), "rtsp://192.168.1.50/");
    }

    #[test]
    fn base_url_includes_nonstandard_port() {
        let s = ServerRecord::new(
            None,
            "192.168.1.50".to_string(),
            8554,
            "DVBS2-1",
            "",
            "generic".to_string(),
            false,
        );
        assert_eq!(s.base_url(), "rtsp://192.168.1.50:8554/");
    }

    #[test]
    fn identity_string_includes_source_address_prefix() {
        let s = ServerRecord::new(
            Some("10.0.0.5".to_string()),
            "192.168.1.50".to_string(),
            554,
            "DVBS2-1",
            "",
            "generic".to_string(),
            false,
        );
        assert_eq!(
            s.identity_string(),
            "10.0.0.5@192.168.1.50|DVBS2-1|generic"
        );
    }
}
