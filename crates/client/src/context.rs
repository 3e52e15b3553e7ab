//! Explicitly constructed application context.
//!
//! Everything the app needs is built once in [`AppContext::boot`] and
//! passed down; nothing lives in a global. [`AppContext::shutdown`]
//! stops the background persistence task and writes a final snapshot.

use std::sync::Arc;

use solarcare_core::{AppState, Clock, Store};
use solarcare_persist::{default_migrations, spawn_persistence, PersistConfig, PersistError, Persistor};
use solarcare_storage::{ApiCache, KeyValueStore, OfflineQueue, StorageHelper};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::api::ApiClient;
use crate::auth::AuthService;
use crate::base_query::BaseQuery;
use crate::config::ClientConfig;
use crate::logout::LogoutCoordinator;
use crate::query_cache::QueryCache;
use crate::transport::HttpTransport;

pub struct AppContext {
    pub config: Arc<ClientConfig>,
    pub store: Store,
    pub api: ApiClient,
    pub auth: AuthService,
    pub cache: ApiCache,
    persistor: Arc<Persistor>,
    cancel: CancellationToken,
    persistence: JoinHandle<()>,
}

impl AppContext {
    /// Rehydrate the session, build the store and wire every service.
    pub async fn boot(
        config: ClientConfig,
        kv: Arc<dyn KeyValueStore>,
        transport: Arc<dyn HttpTransport>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let config = Arc::new(config);
        let storage = StorageHelper::new(kv);

        let persistor = Arc::new(Persistor::new(
            storage.clone(),
            default_migrations(),
            Arc::clone(&clock),
            PersistConfig::default(),
        ));
        let auth_state = persistor.rehydrate().await;
        let store = Store::new(AppState {
            auth: auth_state,
            ..Default::default()
        });

        let cancel = CancellationToken::new();
        let persistence = spawn_persistence(store.clone(), Arc::clone(&persistor), cancel.clone());

        let cache = ApiCache::new(storage.clone(), Arc::clone(&clock));
        cache.clear_expired().await;

        let queries = QueryCache::new(config.query_freshness);
        let logout = LogoutCoordinator::with_persisted_cache(
            store.clone(),
            queries.clone(),
            cache.clone(),
            config.logout.clone(),
        );
        let base = BaseQuery::new(transport, store.clone(), Arc::clone(&config), logout);
        let offline = OfflineQueue::new(storage, Arc::clone(&clock));
        let api = ApiClient::new(base, queries, cache.clone(), offline);
        let auth = AuthService::new(api.clone(), clock);

        tracing::info!(
            environment = config.environment.as_str(),
            demo = config.use_demo_api,
            logged_in = store.with_state(|s| s.auth.is_logged_in()),
            schema_version = persistor.version(),
            "App context ready"
        );

        Self {
            config,
            store,
            api,
            auth,
            cache,
            persistor,
            cancel,
            persistence,
        }
    }

    /// Stop background work and persist the final auth state.
    pub async fn shutdown(self) -> Result<(), PersistError> {
        self.cancel.cancel();
        if let Err(e) = self.persistence.await {
            tracing::error!(error = %e, "Persistence task ended abnormally");
        }
        let auth = self.store.state().auth;
        self.persistor.persist(&auth).await?;
        tracing::info!("App context shut down");
        Ok(())
    }
}
