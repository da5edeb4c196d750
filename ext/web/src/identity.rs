//! Cross-boundary identity: every `WebObject` carries an `InstanceId`, and
//! `HostGuestTable` is the weak-association substrate the marshaller (in
//! `islet_fetch::marshal`) uses to implement round-trip identity (spec §4.5,
//! §9 "Cross-boundary identity").
//!
//! A real embedding would back this with finalizer-driven weak maps on both
//! sides of the boundary; here the guest side is itself Rust (cppgc-managed
//! objects dropped by the V8 garbage collector invoke `Drop`), so dropping
//! the guest handle is sufficient to release its slot without an explicit
//! finalizer callback.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

/// Opaque, monotonically increasing per-process identifier. Spec §3 allows
/// either a 128-bit or numeric id; a `u64` counter is the idiomatic choice
/// for process-local identity on a single host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(u64);

static NEXT_INSTANCE_ID: AtomicU64 = AtomicU64::new(1);

impl InstanceId {
    pub fn next() -> Self {
        Self(NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// The two parallel mappings of spec §3 "Marshaller tables": host→guest and
/// guest→host, each from `InstanceId` to a live handle on the other side.
/// Generic over the handle type `H` since every `WebObject` variant needs its
/// own table (Headers, URL, Blob, ...).
pub struct HostGuestTable<H> {
    host_to_guest: Mutex<HashMap<InstanceId, H>>,
    guest_to_host: Mutex<HashMap<InstanceId, H>>,
}

impl<H> Default for HostGuestTable<H> {
    fn default() -> Self {
        Self {
            host_to_guest: Mutex::new(HashMap::new()),
            guest_to_host: Mutex::new(HashMap::new()),
        }
    }
}

impl<H: Clone> HostGuestTable<H> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_host_to_guest(&self, id: InstanceId, guest_handle: H) {
        self.host_to_guest.lock().insert(id, guest_handle);
    }

    pub fn record_guest_to_host(&self, id: InstanceId, host_handle: H) {
        self.guest_to_host.lock().insert(id, host_handle);
    }

    pub fn lookup_guest(&self, id: InstanceId) -> Option<H> {
        self.host_to_guest.lock().get(&id).cloned()
    }

    pub fn lookup_host(&self, id: InstanceId) -> Option<H> {
        self.guest_to_host.lock().get(&id).cloned()
    }

    pub fn release(&self, id: InstanceId) {
        self.host_to_guest.lock().remove(&id);
        self.guest_to_host.lock().remove(&id);
    }

    /// `clearAllInstanceState()` (spec §5): idempotent by construction since
    /// clearing an already-empty map is a no-op.
    pub fn clear_all(&self) {
        self.host_to_guest.lock().clear();
        self.guest_to_host.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.host_to_guest.lock().len() + self.guest_to_host.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_ids_are_distinct_and_increasing() {
        let a = InstanceId::next();
        let b = InstanceId::next();
        assert!(b.as_u64() > a.as_u64());
    }

    #[test]
    fn round_trip_through_both_tables_recovers_identity() {
        let table: HostGuestTable<&'static str> = HostGuestTable::new();
        let id = InstanceId::next();
        table.record_host_to_guest(id, "guest-handle");
        assert_eq!(table.lookup_guest(id), Some("guest-handle"));
        table.record_guest_to_host(id, "host-handle");
        assert_eq!(table.lookup_host(id), Some("host-handle"));
    }

    #[test]
    fn clear_all_is_idempotent() {
        let table: HostGuestTable<u8> = HostGuestTable::new();
        table.record_host_to_guest(InstanceId::next(), 1);
        table.clear_all();
        assert!(table.is_empty());
        table.clear_all();
        assert!(table.is_empty());
    }
}
