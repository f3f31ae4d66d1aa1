//! Application state shared across handlers.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use moka::future::Cache;
use sqlx::PgPool;
use thiserror::Error;

use crate::config::ServerConfig;
use crate::db::{ProductRepository, RepositoryError};
use crate::error::AppError;
use crate::models::Product;
use crate::services::cloudinary::{CloudinaryClient, UploadError};
use crate::services::email::{EmailError, EmailService};
use crate::services::generation::{GenerationClient, GenerationError};
use crate::services::paypal::{PayPalClient, PaymentError};
use crate::services::tokens::JwtManager;

/// How long the active catalogue stays cached.
const PRODUCT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Error building application state.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("PayPal client: {0}")]
    PayPal(#[from] PaymentError),
    #[error("email service: {0}")]
    Email(#[from] EmailError),
    #[error("Cloudinary client: {0}")]
    Cloudinary(#[from] UploadError),
    #[error("generation client: {0}")]
    Generation(#[from] GenerationError),
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like database connections and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ServerConfig,
    pool: PgPool,
    jwt: JwtManager,
    email: EmailService,
    paypal: Option<PayPalClient>,
    cloudinary: Option<CloudinaryClient>,
    generation: Option<GenerationClient>,
    products: VersionedCache<Vec<Product>>,
}

/// A single cached value keyed by a version counter.
///
/// Invalidation bumps the version, so a load that started before the bump
/// is stored under a key no later reader asks for.
pub struct VersionedCache<T> {
    version: AtomicU64,
    entries: Cache<u64, Arc<T>>,
}

impl<T: Send + Sync + 'static> VersionedCache<T> {
    /// Create an empty cache whose entries live for `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            version: AtomicU64::new(0),
            entries: Cache::builder().max_capacity(2).time_to_live(ttl).build(),
        }
    }

    /// Return the current value, running `load` on a miss.
    ///
    /// # Errors
    ///
    /// Returns whatever `load` fails with. Nothing is cached in that case.
    pub async fn get_or_load<F, Fut, E>(&self, load: F) -> Result<Arc<T>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let version = self.version.load(Ordering::Acquire);
        if let Some(value) = self.entries.get(&version).await {
            return Ok(value);
        }

        let value = Arc::new(load().await?);
        self.entries.insert(version, Arc::clone(&value)).await;
        Ok(value)
    }

    /// Make every earlier and in-flight load stale.
    pub async fn invalidate(&self) {
        let previous = self.version.fetch_add(1, Ordering::AcqRel);
        self.entries.invalidate(&previous).await;
    }
}

impl AppState {
    /// Create a new application state.
    ///
    /// Integrations whose configuration is absent are left disabled.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client fails to build.
    pub fn new(config: ServerConfig, pool: PgPool) -> Result<Self, StateError> {
        let jwt = JwtManager::new(&config.jwt);
        let email = EmailService::new(
            config.email.as_ref(),
            &config.public_base_url,
            &config.frontend_url,
        )?;
        let paypal = config.paypal.as_ref().map(PayPalClient::new).transpose()?;
        let cloudinary = config
            .cloudinary
            .as_ref()
            .map(CloudinaryClient::new)
            .transpose()?;
        let cloud_name = config.cloudinary.as_ref().map(|c| c.cloud_name.as_str());
        let generation = config
            .ai
            .as_ref()
            .map(|ai| GenerationClient::new(ai, cloud_name))
            .transpose()?;

        if paypal.is_none() {
            tracing::warn!("PayPal not configured; payment routes will return 503");
        }
        if cloudinary.is_none() {
            tracing::warn!("Cloudinary not configured; uploads will return 503");
        }
        if generation.is_none() {
            tracing::warn!("AI API not configured; generation will return 503");
        }

        let products = VersionedCache::new(PRODUCT_CACHE_TTL);

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                jwt,
                email,
                paypal,
                cloudinary,
                generation,
                products,
            }),
        })
    }

    /// Get a reference to the server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// Get the JWT manager.
    #[must_use]
    pub fn jwt(&self) -> &JwtManager {
        &self.inner.jwt
    }

    /// Get the email service.
    #[must_use]
    pub fn email(&self) -> &EmailService {
        &self.inner.email
    }

    /// Get the PayPal client, or 503 if PayPal isn't configured.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ServiceUnavailable` if unconfigured.
    pub fn paypal(&self) -> Result<&PayPalClient, AppError> {
        self.inner
            .paypal
            .as_ref()
            .ok_or_else(|| AppError::ServiceUnavailable("Payments are not configured".to_owned()))
    }

    /// Get the Cloudinary client, or 503 if uploads aren't configured.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ServiceUnavailable` if unconfigured.
    pub fn cloudinary(&self) -> Result<&CloudinaryClient, AppError> {
        self.inner
            .cloudinary
            .as_ref()
            .ok_or_else(|| AppError::ServiceUnavailable("Uploads are not configured".to_owned()))
    }

    /// Get the generation client, or 503 if the AI API isn't configured.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ServiceUnavailable` if unconfigured.
    pub fn generation(&self) -> Result<&GenerationClient, AppError> {
        self.inner.generation.as_ref().ok_or_else(|| {
            AppError::ServiceUnavailable("Image generation is not configured".to_owned())
        })
    }

    /// Active products, served from cache when fresh.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if loading from the database fails.
    pub async fn active_products(&self) -> Result<Arc<Vec<Product>>, RepositoryError> {
        self.inner
            .products
            .get_or_load(|| async {
                let products = ProductRepository::new(self.pool()).list_active().await?;
                tracing::debug!(count = products.len(), "Product cache refreshed");
                Ok::<_, RepositoryError>(products)
            })
            .await
    }

    /// Drop the cached catalogue after an admin write.
    pub async fn invalidate_products(&self) {
        self.inner.products.invalidate().await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    type Names = Vec<&'static str>;

    async fn load(cache: &VersionedCache<Names>, names: Names) -> Arc<Names> {
        cache
            .get_or_load(|| async { Ok::<_, RepositoryError>(names) })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_hit_skips_loader() {
        let cache = VersionedCache::new(Duration::from_secs(60));
        assert_eq!(*load(&cache, vec!["royal"]).await, vec!["royal"]);
        assert_eq!(*load(&cache, vec!["ignored"]).await, vec!["royal"]);
    }

    #[tokio::test]
    async fn test_invalidate_forces_reload() {
        let cache = VersionedCache::new(Duration::from_secs(60));
        load(&cache, vec!["royal"]).await;
        cache.invalidate().await;
        assert_eq!(*load(&cache, vec!["canvas"]).await, vec!["canvas"]);
    }

    #[tokio::test]
    async fn test_load_racing_invalidation_is_not_served_later() {
        let cache = VersionedCache::new(Duration::from_secs(60));

        let stale = cache
            .get_or_load(|| async {
                // An admin write lands while the old list is being read
                cache.invalidate().await;
                Ok::<_, RepositoryError>(vec!["old"])
            })
            .await
            .unwrap();
        assert_eq!(*stale, vec!["old"]);

        assert_eq!(*load(&cache, vec!["new"]).await, vec!["new"]);
    }

    #[tokio::test]
    async fn test_failed_load_is_not_cached() {
        let cache: VersionedCache<Names> = VersionedCache::new(Duration::from_secs(60));
        let failed = cache
            .get_or_load(|| async { Err(RepositoryError::NotFound) })
            .await;
        assert!(failed.is_err());
        assert_eq!(*load(&cache, vec!["royal"]).await, vec!["royal"]);
    }
}
