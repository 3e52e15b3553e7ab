use solarcare_core::{Store, UiAction};

/// Holds one slot of the global loading counter for the lifetime of a
/// foreground request.
///
/// `RequestStarted` is dispatched on creation and `RequestFinished`
/// exactly once on drop, whether the request completed, failed, was
/// aborted or its future was dropped mid-flight.
pub struct LoadingGuard {
    store: Option<Store>,
}

impl LoadingGuard {
    /// Start tracking. Background requests get an inert guard.
    pub fn start(store: &Store, background: bool) -> Self {
        if background {
            return Self { store: None };
        }
        store.dispatch(UiAction::RequestStarted);
        Self {
            store: Some(store.clone()),
        }
    }
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        if let Some(store) = self.store.take() {
            store.dispatch(UiAction::RequestFinished);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn foreground_guard_counts_once() {
        let store = Store::default();
        {
            let _guard = LoadingGuard::start(&store, false);
            assert_eq!(store.state().ui.in_flight, 1);
        }
        assert_eq!(store.state().ui.in_flight, 0);
    }

    #[test]
    fn background_guard_is_inert() {
        let store = Store::default();
        let guard = LoadingGuard::start(&store, true);
        assert!(!store.state().ui.is_loading());
        drop(guard);
        assert_eq!(store.state().ui.in_flight, 0);
    }

    #[test]
    fn overlapping_guards_keep_loading_until_last() {
        let store = Store::default();
        let a = LoadingGuard::start(&store, false);
        let b = LoadingGuard::start(&store, false);
        drop(a);
        assert!(store.state().ui.is_loading());
        drop(b);
        assert!(!store.state().ui.is_loading());
    }
}
