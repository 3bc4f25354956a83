//! Per-connection state (spec.md §4.5), pared down from the teacher's
//! `ClientState` to the two things a commander actually reads: which slot
//! a command targets, and whether the connection has authenticated.

use std::sync::atomic::{AtomicU16, Ordering};

/// One connected client. Slot selection here is a single logical database
/// per connection (spec.md Non-goals exclude cross-slot transactions), so
/// `slot` is just a plain atomic rather than a stack of `SELECT`ed
/// contexts.
pub struct ClientState {
    id: u64,
    slot: AtomicU16,
    authenticated: std::sync::atomic::AtomicBool,
}

impl ClientState {
    pub fn new(id: u64, requires_auth: bool) -> Self {
        ClientState {
            id,
            slot: AtomicU16::new(0),
            authenticated: std::sync::atomic::AtomicBool::new(!requires_auth),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn slot(&self) -> u16 {
        self.slot.load(Ordering::Relaxed)
    }

    pub fn set_slot(&self, slot: u16) {
        self.slot.store(slot, Ordering::Relaxed);
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::Relaxed)
    }

    pub fn set_authenticated(&self, value: bool) {
        self.authenticated.store(value, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_unauthenticated_when_auth_required() {
        let c = ClientState::new(1, true);
        assert!(!c.is_authenticated());
        c.set_authenticated(true);
        assert!(c.is_authenticated());
    }

    #[test]
    fn starts_authenticated_when_auth_not_required() {
        let c = ClientState::new(1, false);
        assert!(c.is_authenticated());
    }

    #[test]
    fn slot_defaults_to_zero_and_is_settable() {
        let c = ClientState::new(1, false);
        assert_eq!(c.slot(), 0);
        c.set_slot(7);
        assert_eq!(c.slot(), 7);
    }
}
