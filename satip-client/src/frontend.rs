//! Per frontend-type slot table with assign/attach/detach (C1).

/// A SAT>IP frontend's modulation family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrontendKind {
    DvbS2,
    DvbT,
    DvbT2,
    DvbC,
    DvbC2,
    Atsc,
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    device_id: Option<u32>,
    attached: bool,
}

impl Slot {
    const fn free() -> Self {
        Slot {
            device_id: None,
            attached: false,
        }
    }
}

/// Fixed-capacity array of device-id slots for one frontend kind.
///
/// Invariants upheld by this type alone (cross-pool invariant (a) of
/// the data model — a device appears in at most one slot across *all*
/// pools of a server — is enforced one level up, in [`crate::server::ServerRecord`]):
/// `attached ⇒ assigned` (b), `count()` reflects capacity (c), and
/// `assign` is idempotent for an already-assigned device (d).
#[derive(Debug, Clone)]
pub struct FrontendPool {
    kind: FrontendKind,
    slots: Vec<Slot>,
}

impl FrontendPool {
    /// Reset the slot table to `capacity` free slots of `kind`.
    pub fn init(kind: FrontendKind, capacity: usize) -> Self {
        FrontendPool {
            kind,
            slots: vec![Slot::free(); capacity],
        }
    }

    /// The frontend kind this pool serves.
    pub fn kind(&self) -> FrontendKind {
        self.kind
    }

    /// Capacity parsed from the server's model string.
    pub fn count(&self) -> usize {
        self.slots.len()
    }

    /// Assign `device_id` a slot. Idempotent: returns `true` immediately
    /// if already assigned. Otherwise takes the lowest-index free slot.
    /// Returns `false` if no slot is free.
    pub fn assign(&mut self, device_id: u32) -> bool {
        if self.slots.iter().any(|s| s.device_id == Some(device_id)) {
            return true;
        }
        for slot in &mut self.slots {
            if slot.device_id.is_none() {
                slot.device_id = Some(device_id);
                tracing::debug!(device_id, kind = ?self.kind, "frontend slot assigned");
                return true;
            }
        }
        tracing::warn!(device_id, kind = ?self.kind, "no free frontend slot");
        false
    }

    /// Mark the slot owning `device_id` attached. Fails if the device
    /// does not currently hold a slot.
    pub fn attach(&mut self, device_id: u32) -> bool {
        for slot in &mut self.slots {
            if slot.device_id == Some(device_id) {
                slot.attached = true;
                return true;
            }
        }
        false
    }

    /// Clear attachment and free the slot owning `device_id`.
    pub fn detach(&mut self, device_id: u32) -> bool {
        for slot in &mut self.slots {
            if slot.device_id == Some(device_id) {
                slot.device_id = None;
                slot.attached = false;
                return true;
            }
        }
        false
    }

    /// True if `device_id` currently owns any slot in this pool.
    pub fn is_assigned(&self, device_id: u32) -> bool {
        self.slots.iter().any(|s| s.device_id == Some(device_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assign_takes_lowest_free_index() {
        let mut pool = FrontendPool::init(FrontendKind::DvbS2, 3);
        assert!(pool.assign(1));
        assert!(pool.assign(2));
        pool.detach(1);
        assert!(pool.assign(3));
        assert!(pool.is_assigned(3));
        // slot 0 (freed from device 1) should have been reused for device 3
        assert!(!pool.is_assigned(1));
    }

    #[test]
    fn assign_is_idempotent() {
        let mut pool = FrontendPool::init(FrontendKind::DvbT, 1);
        assert!(pool.assign(5));
        assert!(pool.assign(5));
        assert_eq!(pool.count(), 1);
    }

    #[test]
    fn assign_fails_when_full() {
        let mut pool = FrontendPool::init(FrontendKind::DvbC, 1);
        assert!(pool.assign(1));
        assert!(!pool.assign(2));
    }

    #[test]
    fn attach_requires_assignment() {
        let mut pool = FrontendPool::init(FrontendKind::Atsc, 1);
        assert!(!pool.attach(1));
        pool.assign(1);
        assert!(pool.attach(1));
    }

    #[test]
    fn detach_frees_slot() {
        let mut pool = FrontendPool::init(FrontendKind::DvbT2, 1);
        pool.assign(1);
        pool.attach(1);
        assert!(pool.detach(1));
        assert!(!pool.is_assigned(1));
        assert!(pool.assign(2));
    }
}
