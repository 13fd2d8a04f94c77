use std::sync::Arc;
use std::time::Duration;

use crate::{
    auth::jwt::JwtService,
    config::AppConfig,
    db::{DbConn, PgPool},
    error::{AppError, AppResult},
    storage::ObjectStorage,
};

/// Lifetime of presigned document links.
pub const PRESIGNED_URL_TTL: Duration = Duration::from_secs(300);

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<AppConfig>,
    pub storage: Arc<dyn ObjectStorage>,
    pub jwt: JwtService,
}

impl AppState {
    pub fn new(
        pool: PgPool,
        config: AppConfig,
        storage: Arc<dyn ObjectStorage>,
        jwt: JwtService,
    ) -> Self {
        Self {
            pool,
            config: Arc::new(config),
            storage,
            jwt,
        }
    }

    pub fn db(&self) -> AppResult<DbConn> {
        self.pool
            .get()
            .map_err(|err| AppError::internal(format!("database pool error: {err}")))
    }

    pub async fn presigned_url(&self, key: &str) -> AppResult<String> {
        self.storage
            .presign_get_object(key, PRESIGNED_URL_TTL)
            .await
            .map_err(|err| AppError::internal(format!("failed to generate download URL: {err}")))
    }

    /// Absolute URL for a path served by this API.
    pub fn public_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.public_base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}
