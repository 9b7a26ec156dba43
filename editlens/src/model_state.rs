//! The provider model identity currently believed to work.

use std::sync::{Mutex, MutexGuard, PoisonError};

/// A pinned model together with the epoch it was pinned in.
///
/// The epoch lets a task that observed a fault clear exactly the pin it
/// used, without undoing a newer pin made by someone else in between.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinnedModel {
    /// Provider model identity.
    pub model: String,
    /// Monotonic pin counter.
    pub epoch: u64,
}

#[derive(Debug, Default)]
struct Slot {
    pinned: Option<PinnedModel>,
    epoch: u64,
}

/// Shared working-model cell.
///
/// One instance is passed to every orchestrator that talks to the same
/// provider, so a successful probe is reused across batches.
#[derive(Debug, Default)]
pub struct WorkingModel {
    slot: Mutex<Slot>,
}

impl WorkingModel {
    /// Empty cell; the next task probes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current pin, if any.
    #[must_use]
    pub fn current(&self) -> Option<PinnedModel> {
        self.lock().pinned.clone()
    }

    /// Pins `model` under a fresh epoch.
    pub fn pin(&self, model: impl Into<String>) -> PinnedModel {
        let mut slot = self.lock();
        slot.epoch += 1;
        let pinned = PinnedModel {
            model: model.into(),
            epoch: slot.epoch,
        };
        slot.pinned = Some(pinned.clone());
        pinned
    }

    /// Clears the pin only if it is still `observed`. Returns whether it did.
    pub fn clear_if(&self, observed: &PinnedModel) -> bool {
        let mut slot = self.lock();
        if slot.pinned.as_ref() == Some(observed) {
            slot.pinned = None;
            true
        } else {
            false
        }
    }

    /// Unconditionally forgets the pin.
    pub fn clear(&self) {
        self.lock().pinned = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pin_and_clear() {
        let state = WorkingModel::new();
        assert!(state.current().is_none());

        let pinned = state.pin("flash");
        assert_eq!(state.current(), Some(pinned.clone()));
        assert!(state.clear_if(&pinned));
        assert!(state.current().is_none());
        assert!(!state.clear_if(&pinned));
    }

    #[test]
    fn test_stale_clear_keeps_newer_pin() {
        let state = WorkingModel::new();
        let first = state.pin("flash");
        let second = state.pin("flash");
        assert_ne!(first.epoch, second.epoch);

        assert!(!state.clear_if(&first));
        assert_eq!(state.current(), Some(second));
    }

    #[test]
    fn test_clear_is_unconditional() {
        let state = WorkingModel::new();
        state.pin("pro");
        state.clear();
        assert!(state.current().is_none());
    }
}
