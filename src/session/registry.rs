//! Active session registry.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::rides::RiderId;

/// Tracks which riders currently have a live session.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    active: Arc<DashMap<RiderId, Instant>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `rider_id` for the caller's session. Returns `None` when
    /// another session already holds it.
    pub fn claim(&self, rider_id: RiderId) -> Option<SessionGuard> {
        match self.active.entry(rider_id) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(Instant::now());
                Some(SessionGuard {
                    rider_id,
                    active: self.active.clone(),
                })
            }
        }
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn is_active(&self, rider_id: RiderId) -> bool {
        self.active.contains_key(&rider_id)
    }
}

/// Releases the rider's claim on drop.
#[derive(Debug)]
pub struct SessionGuard {
    rider_id: RiderId,
    active: Arc<DashMap<RiderId, Instant>>,
}

impl SessionGuard {
    pub fn rider_id(&self) -> RiderId {
        self.rider_id
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.active.remove(&self.rider_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_is_exclusive_until_dropped() {
        let registry = SessionRegistry::new();

        let guard = registry.claim(7).unwrap();
        assert_eq!(guard.rider_id(), 7);
        assert!(registry.claim(7).is_none());
        assert!(registry.claim(8).is_some());
        assert_eq!(registry.active_count(), 1);

        drop(guard);
        assert!(!registry.is_active(7));
        assert!(registry.claim(7).is_some());
    }
}
