//! Idempotent session teardown.
//!
//! Concurrent requests that fail authentication all funnel into
//! [`LogoutCoordinator::trigger`]. The coordinator is a small state
//! machine:
//!
//! ```text
//! Idle --trigger--> LoggingOut(shared) --dispatched--> Cooldown(until) --elapsed--> Idle
//! ```
//!
//! The first trigger spawns the teardown task and stores it as a shared
//! future; triggers arriving while it runs await that same future, and
//! triggers during the cooldown return immediately. After the cooldown a
//! fresh login cycle can be torn down again.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};
use solarcare_core::{AuthAction, Store};
use solarcare_storage::{keys, ApiCache};
use tokio::task::JoinError;
use tokio::time::Instant;

use crate::config::LogoutLatchConfig;
use crate::query_cache::QueryCache;

/// Observable phase of the latch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatchPhase {
    Idle,
    LoggingOut,
    Cooldown,
}

enum LatchState {
    Idle,
    LoggingOut(Shared<BoxFuture<'static, ()>>),
    Cooldown { until: Instant },
}

/// Persisted cache keys holding data that belongs to the signed-in user.
const USER_CACHE_KEYS: &[&str] = &[keys::CACHE_LEADS, keys::CACHE_PROFILE];

#[derive(Clone)]
pub struct LogoutCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    store: Store,
    queries: QueryCache,
    persisted: Option<ApiCache>,
    config: LogoutLatchConfig,
    state: Mutex<LatchState>,
    dispatches: AtomicUsize,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, LatchState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A teardown task that died must not leave the latch stuck in
    /// `LoggingOut`; the next trigger starts a fresh episode.
    fn settle(&self, outcome: Result<(), JoinError>) {
        if let Err(e) = outcome {
            tracing::error!(error = %e, "Logout task failed, reopening latch");
            *self.lock() = LatchState::Idle;
        }
    }

    async fn tear_down(&self) {
        self.store.dispatch(AuthAction::Logout);
        self.queries.reset();
        self.dispatches.fetch_add(1, Ordering::SeqCst);

        if let Some(cache) = &self.persisted {
            for key in USER_CACHE_KEYS {
                if let Err(e) = cache.invalidate(key).await {
                    tracing::warn!(key, error = %e, "Failed to drop cached user data on logout");
                }
            }
        }
    }
}

impl LogoutCoordinator {
    pub fn new(store: Store, queries: QueryCache, config: LogoutLatchConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                queries,
                persisted: None,
                config,
                state: Mutex::new(LatchState::Idle),
                dispatches: AtomicUsize::new(0),
            }),
        }
    }

    /// Also drop user-scoped entries from the persisted response cache on
    /// logout.
    pub fn with_persisted_cache(
        store: Store,
        queries: QueryCache,
        cache: ApiCache,
        config: LogoutLatchConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                queries,
                persisted: Some(cache),
                config,
                state: Mutex::new(LatchState::Idle),
                dispatches: AtomicUsize::new(0),
            }),
        }
    }

    /// Number of logout dispatches performed so far.
    pub fn dispatch_count(&self) -> usize {
        self.inner.dispatches.load(Ordering::SeqCst)
    }

    pub fn phase(&self) -> LatchPhase {
        let mut state = self.inner.lock();
        match &*state {
            LatchState::Idle => LatchPhase::Idle,
            LatchState::LoggingOut(_) => LatchPhase::LoggingOut,
            LatchState::Cooldown { until } if Instant::now() < *until => LatchPhase::Cooldown,
            LatchState::Cooldown { .. } => {
                *state = LatchState::Idle;
                LatchPhase::Idle
            }
        }
    }

    /// Tear the session down after an authentication failure.
    ///
    /// At most one logout is dispatched per episode no matter how many
    /// callers trigger it. Resolves once the logout has been dispatched.
    pub async fn trigger(&self) {
        let pending = {
            let mut state = self.inner.lock();
            match &*state {
                LatchState::LoggingOut(pending) => {
                    tracing::debug!("Logout already in progress, awaiting it");
                    pending.clone()
                }
                LatchState::Cooldown { until } if Instant::now() < *until => {
                    tracing::debug!("Logout cooling down, ignoring trigger");
                    return;
                }
                LatchState::Idle | LatchState::Cooldown { .. } => {
                    let pending = self.spawn_teardown();
                    *state = LatchState::LoggingOut(pending.clone());
                    pending
                }
            }
        };
        pending.await;
    }

    fn spawn_teardown(&self) -> Shared<BoxFuture<'static, ()>> {
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(inner.config.coalesce).await;
            tracing::warn!("Authentication failed, logging out");
            inner.tear_down().await;
            *inner.lock() = LatchState::Cooldown {
                until: Instant::now() + inner.config.cooldown,
            };
        });

        let inner = Arc::clone(&self.inner);
        async move { inner.settle(handle.await) }
        .boxed()
        .shared()
    }

    /// Log out right away on explicit user request. Does not touch the
    /// latch.
    pub async fn logout_now(&self) {
        tracing::info!("Logging out");
        self.inner.tear_down().await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use solarcare_core::{AuthState, AppState, Session, UserProfile};

    use super::*;

    fn logged_in_store() -> Store {
        let user: UserProfile =
            serde_json::from_value(serde_json::json!({"id": "1", "phone": "1234567890"})).unwrap();
        Store::new(AppState {
            auth: AuthState::with_session(Session {
                token: "t".into(),
                refresh_token: None,
                user,
                last_login_time: 0,
            }),
            ..Default::default()
        })
    }

    fn coordinator(store: &Store) -> LogoutCoordinator {
        LogoutCoordinator::new(
            store.clone(),
            QueryCache::new(Duration::from_secs(60)),
            LogoutLatchConfig::default(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn walks_through_every_phase() {
        let store = logged_in_store();
        let logout = coordinator(&store);
        assert_eq!(logout.phase(), LatchPhase::Idle);

        let task = tokio::spawn({
            let logout = logout.clone();
            async move { logout.trigger().await }
        });
        tokio::task::yield_now().await;
        assert_eq!(logout.phase(), LatchPhase::LoggingOut);
        assert!(store.state().auth.is_logged_in());

        task.await.unwrap();
        assert_eq!(logout.phase(), LatchPhase::Cooldown);
        assert!(!store.state().auth.is_logged_in());

        tokio::time::advance(Duration::from_millis(1_001)).await;
        assert_eq!(logout.phase(), LatchPhase::Idle);
        assert_eq!(logout.dispatch_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn triggers_during_cooldown_are_ignored() {
        let store = logged_in_store();
        let logout = coordinator(&store);
        logout.trigger().await;
        logout.trigger().await;
        assert_eq!(logout.dispatch_count(), 1);

        tokio::time::advance(Duration::from_secs(2)).await;
        logout.trigger().await;
        assert_eq!(logout.dispatch_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_teardown_reopens_the_latch() {
        let store = logged_in_store();
        let logout = coordinator(&store);
        let stuck = futures::future::ready(()).boxed().shared();
        *logout.inner.lock() = LatchState::LoggingOut(stuck);

        let died = tokio::spawn(async { panic!("teardown blew up") }).await;
        logout.inner.settle(died);
        assert_eq!(logout.phase(), LatchPhase::Idle);

        logout.trigger().await;
        assert_eq!(logout.dispatch_count(), 1);
        assert!(!store.state().auth.is_logged_in());
    }

    #[tokio::test(start_paused = true)]
    async fn logout_resets_query_cache() {
        let store = logged_in_store();
        let queries = QueryCache::new(Duration::from_secs(60));
        let logout = LogoutCoordinator::new(store, queries.clone(), LogoutLatchConfig::default());
        queries.insert("profile", serde_json::json!({}), vec![], queries.generation());

        logout.logout_now().await;
        assert!(queries.is_empty());
        assert_eq!(logout.phase(), LatchPhase::Idle);
    }
}
