//! Process-wide, TTL-expiring map from conversation scope to dialogue state.
//!
//! Expiry is lazy: an entry older than the TTL is dropped by the read that
//! notices it. There is no background sweeper.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tracing::debug;

use crate::booking::state::{BookingSlots, BookingStep, DialogueState, SlotPatch};
use crate::clock::{Clock, SystemClock};
use crate::scope::ConversationScope;

/// Keyed dialogue state with lazy TTL expiry.
///
/// Every operation holds the map lock for its whole read-modify-write, so
/// operations on one scope are linearizable.
pub struct ConversationStateStore {
    entries: Mutex<HashMap<ConversationScope, DialogueState>>,
    ttl: chrono::Duration,
    clock: Arc<dyn Clock>,
}

impl ConversationStateStore {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl: chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX),
            clock,
        }
    }

    /// Current state for `scope`, or `None` if absent or expired.
    pub fn get(&self, scope: &ConversationScope) -> Option<DialogueState> {
        let mut entries = self.lock();
        self.live_entry(&mut entries, scope).cloned()
    }

    /// Upsert the state for `scope`, stamping it with the current time.
    pub fn set(&self, scope: &ConversationScope, step: BookingStep, slots: BookingSlots) {
        let state = DialogueState {
            step,
            slots,
            last_updated_at: self.clock.now(),
        };
        debug!(scope = %scope, step = %step, "Dialogue state set");
        self.lock().insert(scope.clone(), state);
    }

    /// Merge `patch` into the live state for `scope`. Returns `false` (and does
    /// nothing) when there is no live state.
    pub fn merge(&self, scope: &ConversationScope, patch: SlotPatch) -> bool {
        self.update(scope, None, patch)
    }

    /// Merge `patch` and move to `step` in one locked update. Returns `false`
    /// when there is no live state.
    pub fn advance(&self, scope: &ConversationScope, step: BookingStep, patch: SlotPatch) -> bool {
        self.update(scope, Some(step), patch)
    }

    /// Remove the state for `scope`. Idempotent.
    pub fn clear(&self, scope: &ConversationScope) {
        if self.lock().remove(scope).is_some() {
            debug!(scope = %scope, "Dialogue state cleared");
        }
    }

    pub fn is_active(&self, scope: &ConversationScope) -> bool {
        self.get(scope).is_some()
    }

    fn update(
        &self,
        scope: &ConversationScope,
        step: Option<BookingStep>,
        patch: SlotPatch,
    ) -> bool {
        let now = self.clock.now();
        let mut entries = self.lock();
        let Some(state) = self.live_entry(&mut entries, scope) else {
            return false;
        };
        state.slots.apply(patch);
        if let Some(step) = step {
            debug!(scope = %scope, from = %state.step, to = %step, "Dialogue step advanced");
            state.step = step;
        }
        state.last_updated_at = now;
        true
    }

    fn live_entry<'a>(
        &self,
        entries: &'a mut HashMap<ConversationScope, DialogueState>,
        scope: &ConversationScope,
    ) -> Option<&'a mut DialogueState> {
        let expired = entries
            .get(scope)
            .is_some_and(|state| self.clock.now() - state.last_updated_at > self.ttl);
        if expired {
            entries.remove(scope);
            debug!(scope = %scope, "Dialogue state expired");
            return None;
        }
        entries.get_mut(scope)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ConversationScope, DialogueState>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::search::LocationMatch;
    use chrono::{NaiveDate, Utc};

    fn store() -> (ConversationStateStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = ConversationStateStore::with_clock(Duration::from_secs(300), clock.clone());
        (store, clock)
    }

    fn slots() -> BookingSlots {
        BookingSlots::new(
            LocationMatch::Region {
                region_id: "r1".into(),
                name: "Bali".into(),
            },
            "bali",
        )
    }

    #[test]
    fn set_then_get() {
        let (store, _) = store();
        let scope = ConversationScope::direct("u1");
        store.set(&scope, BookingStep::AwaitingLocationConfirm, slots());
        let state = store.get(&scope).unwrap();
        assert_eq!(state.step, BookingStep::AwaitingLocationConfirm);
        assert!(store.is_active(&scope));
    }

    #[test]
    fn clear_makes_inactive_and_is_idempotent() {
        let (store, _) = store();
        let scope = ConversationScope::direct("u1");
        store.set(&scope, BookingStep::AwaitingBudget, slots());
        store.clear(&scope);
        assert!(!store.is_active(&scope));
        store.clear(&scope);
        assert!(!store.is_active(&scope));
    }

    #[test]
    fn expires_after_ttl() {
        let (store, clock) = store();
        let scope = ConversationScope::direct("u1");
        store.set(&scope, BookingStep::AwaitingCheckInDate, slots());

        clock.advance(chrono::Duration::seconds(300));
        assert!(store.is_active(&scope), "exactly TTL is still live");

        clock.advance(chrono::Duration::seconds(1));
        assert!(!store.is_active(&scope));
        // Expired entry was removed, so merge has nothing to touch.
        assert!(!store.merge(&scope, SlotPatch::default()));
    }

    #[test]
    fn merge_restamps_and_extends_lifetime() {
        let (store, clock) = store();
        let scope = ConversationScope::direct("u1");
        store.set(&scope, BookingStep::AwaitingCheckInDate, slots());

        clock.advance(chrono::Duration::seconds(200));
        let check_in = NaiveDate::from_ymd_opt(2025, 11, 16).unwrap();
        assert!(store.merge(
            &scope,
            SlotPatch {
                check_in: Some(check_in),
                ..Default::default()
            }
        ));

        clock.advance(chrono::Duration::seconds(200));
        let state = store.get(&scope).unwrap();
        assert_eq!(state.slots.check_in, Some(check_in));
    }

    #[test]
    fn advance_moves_step_and_keeps_slots() {
        let (store, _) = store();
        let scope = ConversationScope::grouped("g1", "u1");
        store.set(&scope, BookingStep::AwaitingLocationConfirm, slots());
        assert!(store.advance(
            &scope,
            BookingStep::AwaitingCheckInDate,
            SlotPatch {
                location_confirmed: Some(true),
                ..Default::default()
            }
        ));
        let state = store.get(&scope).unwrap();
        assert_eq!(state.step, BookingStep::AwaitingCheckInDate);
        assert!(state.slots.location_confirmed);
        assert_eq!(state.slots.query, "bali");
    }

    #[test]
    fn merge_without_state_is_noop() {
        let (store, _) = store();
        let scope = ConversationScope::direct("nobody");
        assert!(!store.merge(&scope, SlotPatch::default()));
        assert!(store.get(&scope).is_none());
    }

    #[test]
    fn scopes_are_independent() {
        let (store, _) = store();
        let direct = ConversationScope::direct("u1");
        let grouped = ConversationScope::grouped("g1", "u1");
        store.set(&direct, BookingStep::AwaitingRoomCount, slots());
        assert!(!store.is_active(&grouped));
        store.set(&grouped, BookingStep::AwaitingBudget, slots());
        store.clear(&direct);
        assert!(store.is_active(&grouped));
    }
}
