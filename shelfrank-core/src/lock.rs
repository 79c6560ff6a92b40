/// Per-(user, tier) exclusivity for in-flight insertions.
///
/// The engine assumes it owns the tier snapshot for the whole insertion.
/// Two insertions into the same tier would each compute a position against
/// a stale store, so callers take a guard before loading the tier and hold
/// it until the result is committed.
use std::sync::Arc;

use dashmap::DashSet;

use crate::error::RankingError;
use crate::types::TierKey;

/// Registry of tiers with an insertion in flight. Cheap to clone; clones
/// share the same registry.
#[derive(Debug, Clone, Default)]
pub struct TierLocks {
    held: Arc<DashSet<TierKey>>,
}

impl TierLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the tier, or fail if another insertion holds it.
    pub fn try_acquire(&self, key: &TierKey) -> Result<InsertionGuard, RankingError> {
        if !self.held.insert(key.clone()) {
            tracing::warn!(user_id = %key.user_id, tier = %key.tier, "insertion already in progress");
            return Err(RankingError::InsertionInProgress {
                user_id: key.user_id.clone(),
                tier: key.tier,
            });
        }
        Ok(InsertionGuard {
            held: Arc::clone(&self.held),
            key: key.clone(),
        })
    }
}

/// Releases its tier when dropped.
#[derive(Debug)]
pub struct InsertionGuard {
    held: Arc<DashSet<TierKey>>,
    key: TierKey,
}

impl InsertionGuard {
    pub fn key(&self) -> &TierKey {
        &self.key
    }
}

impl Drop for InsertionGuard {
    fn drop(&mut self) {
        self.held.remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Tier;

    #[test]
    fn test_second_acquire_fails_until_release() {
        let locks = TierLocks::new();
        let key = TierKey::new("u1", Tier::Liked);

        let guard = locks.try_acquire(&key).unwrap();
        assert_eq!(guard.key(), &key);

        let err = locks.try_acquire(&key).unwrap_err();
        assert!(matches!(err, RankingError::InsertionInProgress { tier: Tier::Liked, .. }));

        drop(guard);
        assert!(locks.try_acquire(&key).is_ok());
    }

    #[test]
    fn test_other_tiers_and_users_are_independent() {
        let locks = TierLocks::new();
        let _a = locks.try_acquire(&TierKey::new("u1", Tier::Liked)).unwrap();
        let _b = locks.try_acquire(&TierKey::new("u1", Tier::Fine)).unwrap();
        let _c = locks.try_acquire(&TierKey::new("u2", Tier::Liked)).unwrap();
    }

    #[test]
    fn test_clones_share_registry() {
        let locks = TierLocks::new();
        let other = locks.clone();
        let key = TierKey::new("u1", Tier::Disliked);
        let _guard = locks.try_acquire(&key).unwrap();
        assert!(other.try_acquire(&key).is_err());
    }

    #[test]
    fn test_concurrent_acquire_admits_one() {
        let locks = TierLocks::new();
        let key = TierKey::new("u1", Tier::Liked);
        let barrier = Arc::new(std::sync::Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = locks.clone();
                let key = key.clone();
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    // Hold the guard until every thread has tried.
                    let guard = locks.try_acquire(&key).ok();
                    barrier.wait();
                    guard.is_some()
                })
            })
            .collect();

        let winners = handles.into_iter().map(|h| h.join().unwrap()).filter(|&won| won).count();
        assert_eq!(winners, 1);
    }
}
