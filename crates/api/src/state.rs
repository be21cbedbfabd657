//! Application state shared across handlers.

use std::sync::Arc;

use aws_config::{BehaviorVersion, Region};
use lettre::transport::smtp::Error as SmtpError;
use sqlx::PgPool;

use tee_studio_core::{Currency, Email};

use crate::clients::{
    ArtifactStore, DeeplClient, DynamoRequestCache, GenerationError, ImageGenerator, Mailer,
    MemoryRequestCache, PaymentError, PaymentGateway, RequestCache, S3ArtifactStore, SmtpMailer,
    StabilityClient, StripeClient, TranslationError, Translator,
};
use crate::config::{ApiConfig, TranslationPolicy};
use crate::db::{
    CartRepository, CartStore, DesignRepository, DesignStore, OrderRepository, OrderStore,
    UserRepository, UserStore,
};
use crate::services::auth::{AuthService, TokenKeys};
use crate::services::cart::CartService;
use crate::services::checkout::CheckoutService;
use crate::services::designs::DesignService;
use crate::services::notifications::NotificationService;
use crate::services::orders::OrderService;

/// Error building the production state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("payment client: {0}")]
    Payment(#[from] PaymentError),
    #[error("generation client: {0}")]
    Generation(#[from] GenerationError),
    #[error("translation client: {0}")]
    Translation(#[from] TranslationError),
    #[error("SMTP transport: {0}")]
    Smtp(#[from] SmtpError),
}

/// The relational stores.
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserStore>,
    pub designs: Arc<dyn DesignStore>,
    pub carts: Arc<dyn CartStore>,
    pub orders: Arc<dyn OrderStore>,
}

impl Stores {
    /// `PostgreSQL` repositories sharing one pool.
    #[must_use]
    pub fn postgres(pool: &PgPool) -> Self {
        Self {
            users: Arc::new(UserRepository::new(pool.clone())),
            designs: Arc::new(DesignRepository::new(pool.clone())),
            carts: Arc::new(CartRepository::new(pool.clone())),
            orders: Arc::new(OrderRepository::new(pool.clone())),
        }
    }
}

/// The external service clients.
#[derive(Clone)]
pub struct Clients {
    pub payments: Arc<dyn PaymentGateway>,
    pub generator: Arc<dyn ImageGenerator>,
    pub translator: Option<Arc<dyn Translator>>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub request_cache: Arc<dyn RequestCache>,
    pub mailer: Arc<dyn Mailer>,
}

impl Clients {
    /// Production clients built from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client or the SMTP transport cannot be built.
    pub async fn from_config(config: &ApiConfig) -> Result<Self, StateError> {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.storage.region.clone()))
            .load()
            .await;

        let translator = match &config.translation {
            Some(translation) => {
                let client: Arc<dyn Translator> =
                    Arc::new(DeeplClient::new(translation, config.http_timeout)?);
                Some(client)
            }
            None => None,
        };

        let request_cache: Arc<dyn RequestCache> = match &config.request_cache {
            Some(tables) => Arc::new(DynamoRequestCache::new(&sdk_config, tables.clone())),
            None => Arc::new(MemoryRequestCache::new()),
        };

        Ok(Self {
            payments: Arc::new(StripeClient::new(&config.stripe, config.http_timeout)?),
            generator: Arc::new(StabilityClient::new(
                &config.stability,
                config.http_timeout,
            )?),
            translator,
            artifacts: Arc::new(S3ArtifactStore::new(&sdk_config, &config.storage)),
            request_cache,
            mailer: Arc::new(SmtpMailer::new(&config.email)?),
        })
    }
}

/// Non-secret settings the services need per request.
pub struct Settings {
    pub tokens: TokenKeys,
    pub translation_policy: TranslationPolicy,
    pub currency: Currency,
    pub admin_email: Email,
}

impl Settings {
    #[must_use]
    pub fn from_config(config: &ApiConfig) -> Self {
        Self {
            tokens: TokenKeys::new(&config.jwt_secret, config.token_ttl),
            translation_policy: config.translation_policy,
            currency: config.stripe.currency,
            admin_email: config.email.admin_email.clone(),
        }
    }
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc`. Handlers build a service per
/// request with the accessors below.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    stores: Stores,
    clients: Clients,
    settings: Settings,
}

impl AppState {
    /// Assemble state from already-built parts.
    #[must_use]
    pub fn new(stores: Stores, clients: Clients, settings: Settings) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                stores,
                clients,
                settings,
            }),
        }
    }

    /// Production state: `PostgreSQL` stores and real clients.
    ///
    /// # Errors
    ///
    /// Returns an error if a client cannot be built.
    pub async fn from_config(config: &ApiConfig, pool: &PgPool) -> Result<Self, StateError> {
        Ok(Self::new(
            Stores::postgres(pool),
            Clients::from_config(config).await?,
            Settings::from_config(config),
        ))
    }

    #[must_use]
    pub fn stores(&self) -> &Stores {
        &self.inner.stores
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenKeys {
        &self.inner.settings.tokens
    }

    #[must_use]
    pub fn auth(&self) -> AuthService<'_> {
        AuthService::new(self.inner.stores.users.as_ref(), self.tokens())
    }

    #[must_use]
    pub fn designs(&self) -> DesignService<'_> {
        let AppStateInner {
            stores,
            clients,
            settings,
        } = self.inner.as_ref();
        DesignService::new(
            stores.designs.as_ref(),
            clients.generator.as_ref(),
            clients.translator.as_deref(),
            settings.translation_policy,
            clients.artifacts.as_ref(),
            clients.request_cache.as_ref(),
        )
    }

    #[must_use]
    pub fn cart(&self) -> CartService<'_> {
        let stores = &self.inner.stores;
        CartService::new(stores.carts.as_ref(), stores.designs.as_ref())
    }

    #[must_use]
    pub fn checkout(&self) -> CheckoutService<'_> {
        let AppStateInner {
            stores,
            clients,
            settings,
        } = self.inner.as_ref();
        CheckoutService::new(
            stores.users.as_ref(),
            stores.carts.as_ref(),
            stores.orders.as_ref(),
            clients.payments.as_ref(),
            self.notifications(),
            settings.currency,
        )
    }

    #[must_use]
    pub fn orders(&self) -> OrderService<'_> {
        let stores = &self.inner.stores;
        OrderService::new(
            stores.orders.as_ref(),
            stores.users.as_ref(),
            self.notifications(),
        )
    }

    #[must_use]
    pub fn notifications(&self) -> NotificationService<'_> {
        NotificationService::new(
            self.inner.clients.mailer.as_ref(),
            &self.inner.settings.admin_email,
        )
    }
}
