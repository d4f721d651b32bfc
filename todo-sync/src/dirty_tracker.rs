//! # DirtyTracker
//! Wraps the reconciler's collection with a "dirty" flag, so presentation listeners are told about changes
//! once per flush instead of once per mutation, and only when something actually changed.

use std::ops::{Deref, DerefMut};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum DirtyState {
    /// No pending notifications
    Clean,
    /// Listeners need to hear about a change
    Dirty,
}

#[derive(Clone, Debug)]
pub(crate) struct DirtyTracker<Store> {
    store: Store,
    dirty_state: DirtyState,
    loaded_at_least_once: bool,
}

impl<Store: Default> Default for DirtyTracker<Store> {
    fn default() -> Self {
        Self {
            store: Default::default(),
            dirty_state: DirtyState::Clean,
            loaded_at_least_once: false,
        }
    }
}

/// Smart pointer that marks the store as dirty when dereferenced mutably
pub(crate) struct DirtyOnDerefMut<'a, Store> {
    store: &'a mut Store,
    dirty_state: &'a mut DirtyState,
}

impl<Store> Deref for DirtyOnDerefMut<'_, Store> {
    type Target = Store;

    fn deref(&self) -> &Self::Target {
        self.store
    }
}

impl<Store> DerefMut for DirtyOnDerefMut<'_, Store> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        *self.dirty_state = DirtyState::Dirty;
        self.store
    }
}

impl<Store> DirtyTracker<Store> {
    /// Returns true if the `loaded` marker was changed
    pub(crate) fn mark_loaded(&mut self) -> bool {
        if self.loaded_at_least_once {
            return false;
        }
        self.loaded_at_least_once = true;
        self.dirty_state = DirtyState::Dirty;
        true
    }

    pub(crate) fn loaded_at_least_once(&self) -> bool {
        self.loaded_at_least_once
    }

    pub(crate) fn store(&self) -> &Store {
        &self.store
    }

    pub(crate) fn store_mut(&mut self) -> DirtyOnDerefMut<'_, Store> {
        DirtyOnDerefMut {
            store: &mut self.store,
            dirty_state: &mut self.dirty_state,
        }
    }

    /// Resets to clean, returning whether there was anything to notify about.
    pub(crate) fn take_dirty(&mut self) -> bool {
        std::mem::replace(&mut self.dirty_state, DirtyState::Clean) == DirtyState::Dirty
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_do_not_dirty() {
        let mut tracker = DirtyTracker::<Vec<u8>>::default();
        let store = tracker.store_mut();
        assert!(store.is_empty());
        drop(store);
        assert!(!tracker.take_dirty());
    }

    #[test]
    fn test_writes_dirty_until_taken() {
        let mut tracker = DirtyTracker::<Vec<u8>>::default();
        tracker.store_mut().push(1);
        tracker.store_mut().push(2);
        assert!(tracker.take_dirty());
        assert!(!tracker.take_dirty());
        assert_eq!(tracker.store(), &vec![1, 2]);
    }

    #[test]
    fn test_mark_loaded_only_once() {
        let mut tracker = DirtyTracker::<Vec<u8>>::default();
        assert!(!tracker.loaded_at_least_once());
        assert!(tracker.mark_loaded());
        assert!(tracker.take_dirty());
        assert!(!tracker.mark_loaded());
        assert!(!tracker.take_dirty());
        assert!(tracker.loaded_at_least_once());
    }
}
