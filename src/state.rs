use std::sync::Arc;

use tracing::{info, warn};

use crate::{
    config::{AppConfig, StorageConfig},
    db,
    memory::MemoryStore,
    posts::repo::{PgPostRepo, PostRepo},
    storage::{LocalStorage, S3Storage, StorageClient},
    users::repo::{PgUserRepo, UserRepo},
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: Arc<dyn UserRepo>,
    pub posts: Arc<dyn PostRepo>,
    pub storage: Arc<dyn StorageClient>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let (users, posts) = match &config.database_url {
            Some(url) => {
                let pool = db::connect(url).await?;
                db::migrate(&pool).await;
                (
                    Arc::new(PgUserRepo::new(pool.clone())) as Arc<dyn UserRepo>,
                    Arc::new(PgPostRepo::new(pool)) as Arc<dyn PostRepo>,
                )
            }
            None => {
                warn!("DATABASE_URL not set; records are kept in memory only");
                let store = Arc::new(MemoryStore::new());
                (
                    store.clone() as Arc<dyn UserRepo>,
                    store as Arc<dyn PostRepo>,
                )
            }
        };

        let storage = match &config.storage {
            StorageConfig::Local { dir } => {
                info!(dir = %dir.display(), "storing attachments on local disk");
                Arc::new(LocalStorage::new(dir.clone()).await?) as Arc<dyn StorageClient>
            }
            StorageConfig::S3 {
                endpoint,
                bucket,
                access_key,
                secret_key,
                region,
            } => {
                info!(%endpoint, %bucket, "storing attachments in s3");
                Arc::new(S3Storage::new(endpoint, bucket, access_key, secret_key, region).await?)
                    as Arc<dyn StorageClient>
            }
        };

        Ok(Self::from_parts(config, users, posts, storage))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        users: Arc<dyn UserRepo>,
        posts: Arc<dyn PostRepo>,
        storage: Arc<dyn StorageClient>,
    ) -> Self {
        Self {
            config,
            users,
            posts,
            storage,
        }
    }

    /// In-memory records and attachments; the storage handle is returned for inspection.
    #[cfg(test)]
    pub fn in_memory() -> (Self, Arc<crate::storage::memory::MemoryStorage>) {
        use crate::config::JwtConfig;
        use crate::storage::memory::MemoryStorage;

        let config = Arc::new(AppConfig {
            database_url: None,
            jwt: JwtConfig {
                secret: "test".into(),
                issuer: "test".into(),
                audience: "test".into(),
                ttl_minutes: 60 * 24,
            },
            storage: StorageConfig::Local {
                dir: "unused".into(),
            },
        });
        let store = Arc::new(MemoryStore::new());
        let storage = Arc::new(MemoryStorage::default());
        let state = Self::from_parts(
            config,
            store.clone(),
            store,
            storage.clone() as Arc<dyn StorageClient>,
        );
        (state, storage)
    }
}
