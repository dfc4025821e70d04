//! Rank-checked locks
//!
//! Every map in the admin is guarded by its own lock with a short critical
//! section. Locks carry a [`LockRank`]; a thread may only acquire a lock whose
//! rank is strictly greater than every rank it already holds. Two locks of the
//! same rank can therefore never be held together, which is how the
//! "no single lock spans two maps" rule is enforced, and the serializer lock
//! (lowest rank) is always taken before a sender/receiver map lock.
//!
//! The check runs in debug builds only. Guards are `!Send`, so a guard can never
//! be carried across an `.await` into another thread and the per-thread rank
//! stack stays accurate.

use std::ops::{Deref, DerefMut};

use parking_lot::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Acquisition rank, lowest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LockRank {
    /// Serializer registry
    Serializers = 0,
    /// Admin sender/receiver/discovered-endpoint maps
    AdminMap = 1,
    /// Per-object maps (sender connection, receiver connections, subscribers)
    Entity = 2,
    /// State nested inside an entity (per-component send entries)
    EntityState = 3,
    /// Leaf metric records
    Metrics = 4,
}

#[cfg(debug_assertions)]
mod held {
    use std::cell::RefCell;

    use super::LockRank;

    thread_local! {
        static HELD: RefCell<Vec<(LockRank, &'static str)>> = const { RefCell::new(Vec::new()) };
    }

    pub(super) fn push(rank: LockRank, name: &'static str) {
        HELD.with(|held| {
            let mut held = held.borrow_mut();
            if let Some(&(top, top_name)) = held.iter().max_by_key(|(r, _)| *r) {
                assert!(
                    rank > top,
                    "lock order violation: acquiring {name} ({rank:?}) while holding {top_name} ({top:?})"
                );
            }
            held.push((rank, name));
        });
    }

    pub(super) fn pop(rank: LockRank, name: &'static str) {
        HELD.with(|held| {
            let mut held = held.borrow_mut();
            if let Some(pos) = held.iter().rposition(|&(r, n)| r == rank && n == name) {
                held.remove(pos);
            }
        });
    }
}

struct RankToken {
    #[cfg(debug_assertions)]
    rank: LockRank,
    #[cfg(debug_assertions)]
    name: &'static str,
}

impl RankToken {
    #[cfg_attr(not(debug_assertions), allow(unused_variables))]
    fn acquire(rank: LockRank, name: &'static str) -> Self {
        #[cfg(debug_assertions)]
        {
            held::push(rank, name);
            Self { rank, name }
        }
        #[cfg(not(debug_assertions))]
        {
            Self {}
        }
    }
}

impl Drop for RankToken {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        held::pop(self.rank, self.name);
    }
}

/// Mutex with an acquisition rank
pub struct RankedMutex<T> {
    rank: LockRank,
    name: &'static str,
    inner: Mutex<T>,
}

impl<T> RankedMutex<T> {
    pub fn new(rank: LockRank, name: &'static str, value: T) -> Self {
        Self {
            rank,
            name,
            inner: Mutex::new(value),
        }
    }

    pub fn lock(&self) -> RankedMutexGuard<'_, T> {
        // Checked before blocking so a violation panics instead of deadlocking
        let token = RankToken::acquire(self.rank, self.name);
        RankedMutexGuard {
            guard: self.inner.lock(),
            _token: token,
        }
    }
}

pub struct RankedMutexGuard<'a, T> {
    guard: MutexGuard<'a, T>,
    _token: RankToken,
}

impl<T> Deref for RankedMutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for RankedMutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

/// Read/write lock with an acquisition rank
pub struct RankedRwLock<T> {
    rank: LockRank,
    name: &'static str,
    inner: RwLock<T>,
}

impl<T> RankedRwLock<T> {
    pub fn new(rank: LockRank, name: &'static str, value: T) -> Self {
        Self {
            rank,
            name,
            inner: RwLock::new(value),
        }
    }

    pub fn read(&self) -> RankedReadGuard<'_, T> {
        let token = RankToken::acquire(self.rank, self.name);
        RankedReadGuard {
            guard: self.inner.read(),
            _token: token,
        }
    }

    pub fn write(&self) -> RankedWriteGuard<'_, T> {
        let token = RankToken::acquire(self.rank, self.name);
        RankedWriteGuard {
            guard: self.inner.write(),
            _token: token,
        }
    }
}

pub struct RankedReadGuard<'a, T> {
    guard: RwLockReadGuard<'a, T>,
    _token: RankToken,
}

impl<T> Deref for RankedReadGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

pub struct RankedWriteGuard<'a, T> {
    guard: RwLockWriteGuard<'a, T>,
    _token: RankToken,
}

impl<T> Deref for RankedWriteGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for RankedWriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascending_ranks_allowed() {
        let serializers = RankedRwLock::new(LockRank::Serializers, "serializers", 1);
        let senders = RankedMutex::new(LockRank::AdminMap, "senders", 2);

        let s = serializers.read();
        let m = senders.lock();
        assert_eq!(*s + *m, 3);
    }

    #[test]
    fn test_release_then_reacquire_same_rank() {
        let senders = RankedMutex::new(LockRank::AdminMap, "senders", 0);
        let receivers = RankedMutex::new(LockRank::AdminMap, "receivers", 0);

        *senders.lock() += 1;
        *receivers.lock() += 1;

        assert_eq!(*senders.lock(), 1);
        assert_eq!(*receivers.lock(), 1);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "lock order violation")]
    fn test_two_maps_held_together_panics() {
        let senders = RankedMutex::new(LockRank::AdminMap, "senders", ());
        let receivers = RankedMutex::new(LockRank::AdminMap, "receivers", ());

        let _a = senders.lock();
        let _b = receivers.lock();
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "lock order violation")]
    fn test_serializer_after_map_panics() {
        let serializers = RankedRwLock::new(LockRank::Serializers, "serializers", ());
        let senders = RankedMutex::new(LockRank::AdminMap, "senders", ());

        let _m = senders.lock();
        let _s = serializers.write();
    }
}
