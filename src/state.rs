use std::sync::Arc;

use tracing::info;

use crate::{
    config::{AppConfig, JwtConfig, StoreBackend},
    db,
    meals::{
        classifier::{MealClassifier, SlotSource},
        memory::MemoryMealStore,
        repo::{MealStore, PgMealStore},
    },
};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn MealStore>,
    pub classifier: MealClassifier,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub async fn from_config(config: AppConfig) -> anyhow::Result<Self> {
        let config = Arc::new(config);
        let state = match config.store {
            StoreBackend::Postgres => {
                let pg = Arc::new(PgMealStore::new(db::connect(&config).await?));
                Self::from_parts(pg.clone(), pg, config.clone())
            }
            StoreBackend::Memory => {
                let mem = Arc::new(MemoryMealStore::new());
                Self::from_parts(mem.clone(), mem, config.clone())
            }
        };
        info!(store = ?config.store, slot_ttl_secs = config.slot_cache_ttl_secs, "state ready");
        Ok(state)
    }

    pub fn from_parts(
        store: Arc<dyn MealStore>,
        slots: Arc<dyn SlotSource>,
        config: Arc<AppConfig>,
    ) -> Self {
        let classifier = MealClassifier::new(slots, config.slot_cache_ttl());
        Self {
            store,
            classifier,
            config,
        }
    }

    /// Memory-backed state with the seeded slot table and fixed test JWT keys.
    pub fn fake() -> Self {
        let config = Arc::new(AppConfig {
            store: StoreBackend::Memory,
            database_url: None,
            db_max_connections: 1,
            db_acquire_timeout_secs: 1,
            slot_cache_ttl_secs: 24 * 60 * 60,
            jwt: JwtConfig {
                secret: "test".into(),
                issuer: "test".into(),
                audience: "test".into(),
                ttl_minutes: 5,
            },
            host: "127.0.0.1".into(),
            port: 0,
        });
        let mem = Arc::new(MemoryMealStore::new());
        Self::from_parts(mem.clone(), mem, config)
    }
}
