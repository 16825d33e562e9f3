use std::path::PathBuf;

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

/// Where uploaded attachments live.
#[derive(Debug, Clone, Deserialize)]
pub enum StorageConfig {
    Local {
        dir: PathBuf,
    },
    S3 {
        endpoint: String,
        bucket: String,
        access_key: String,
        secret_key: String,
        region: String,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// `None` selects the in-process document store.
    pub database_url: Option<String>,
    pub jwt: JwtConfig,
    pub storage: StorageConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").ok().filter(|v| !v.is_empty());
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "blogd".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "blogd-users".into()),
            ttl_minutes: std::env::var("JWT_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60 * 24),
        };

        let backend = std::env::var("STORAGE_BACKEND").unwrap_or_else(|_| "local".into());
        let storage = match backend.as_str() {
            "local" => StorageConfig::Local {
                dir: std::env::var("UPLOADS_DIR")
                    .unwrap_or_else(|_| "uploads".into())
                    .into(),
            },
            "s3" => StorageConfig::S3 {
                endpoint: std::env::var("MINIO_ENDPOINT").context("MINIO_ENDPOINT must be set")?,
                bucket: std::env::var("MINIO_BUCKET").context("MINIO_BUCKET must be set")?,
                access_key: std::env::var("MINIO_ACCESS_KEY")
                    .context("MINIO_ACCESS_KEY must be set")?,
                secret_key: std::env::var("MINIO_SECRET_KEY")
                    .context("MINIO_SECRET_KEY must be set")?,
                region: std::env::var("MINIO_REGION").unwrap_or_else(|_| "us-east-1".into()),
            },
            other => anyhow::bail!("unknown STORAGE_BACKEND {other:?}, expected local or s3"),
        };

        Ok(Self {
            database_url,
            jwt,
            storage,
        })
    }
}
