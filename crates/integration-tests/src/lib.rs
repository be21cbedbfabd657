//! Integration tests for the Tee Studio API.
//!
//! The full router runs in-process against in-memory stores and fake
//! external clients, so the suite needs no database or network.
//!
//! ```bash
//! cargo test -p tee-studio-integration-tests
//! ```

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use http_body_util::BodyExt;
use secrecy::SecretString;
use serde_json::Value;
use tower::ServiceExt;

use tee_studio_api::app;
use tee_studio_api::clients::{MemoryRequestCache, Translator};
use tee_studio_api::config::TranslationPolicy;
use tee_studio_api::db::UserStore;
use tee_studio_api::services::auth::TokenKeys;
use tee_studio_api::state::{AppState, Clients, Settings, Stores};
use tee_studio_api::testing::{
    FakeArtifactStore, FakeImageGenerator, FakePaymentGateway, FakeTranslator, InMemoryStore,
    RecordingMailer,
};
use tee_studio_core::{Currency, Email};

pub const ADMIN_NOTIFY_EMAIL: &str = "ops@teestudio.test";
pub const PASSWORD: &str = "correct horse battery";

/// A router wired to in-memory doubles, plus handles to inspect them.
pub struct TestApp {
    pub router: Router,
    pub store: Arc<InMemoryStore>,
    pub payments: Arc<FakePaymentGateway>,
    pub generator: Arc<FakeImageGenerator>,
    pub translator: Arc<FakeTranslator>,
    pub artifacts: Arc<FakeArtifactStore>,
    pub mailer: Arc<RecordingMailer>,
}

/// A decoded response.
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_policy(TranslationPolicy::Fallback)
    }

    pub fn with_policy(translation_policy: TranslationPolicy) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let payments = Arc::new(FakePaymentGateway::new());
        let generator = Arc::new(FakeImageGenerator::new());
        let translator = Arc::new(FakeTranslator::new());
        let artifacts = Arc::new(FakeArtifactStore::new());
        let mailer = Arc::new(RecordingMailer::new());

        let stores = Stores {
            users: store.clone(),
            designs: store.clone(),
            carts: store.clone(),
            orders: store.clone(),
        };
        let translator_client: Arc<dyn Translator> = translator.clone();
        let clients = Clients {
            payments: payments.clone(),
            generator: generator.clone(),
            translator: Some(translator_client),
            artifacts: artifacts.clone(),
            request_cache: Arc::new(MemoryRequestCache::new()),
            mailer: mailer.clone(),
        };
        let settings = Settings {
            tokens: TokenKeys::new(
                &SecretString::from("integration-test-secret-at-least-32-bytes"),
                Duration::from_secs(3600),
            ),
            translation_policy,
            currency: Currency::Jpy,
            admin_email: Email::parse(ADMIN_NOTIFY_EMAIL).unwrap(),
        };

        let router = app(AppState::new(stores, clients, settings), &[]);

        Self {
            router,
            store,
            payments,
            generator,
            translator,
            artifacts,
            mailer,
        }
    }

    /// Send one request through the router.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };

        TestResponse { status, body }
    }

    /// Sign up and return the bearer token.
    pub async fn signup(&self, email: &str) -> String {
        let response = self
            .request(
                Method::POST,
                "/auth/signup",
                None,
                Some(serde_json::json!({ "email": email, "password": PASSWORD })),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{:?}", response.body);
        response.body["token"].as_str().unwrap().to_owned()
    }

    /// Grant admin rights to an existing account.
    pub async fn promote(&self, email: &str) {
        let email = Email::parse(email).unwrap();
        UserStore::set_admin(&*self.store, &email, true)
            .await
            .unwrap();
    }

    /// Generate a design and return its id.
    pub async fn generate_design(&self, token: &str, prompt: &str) -> i64 {
        let response = self
            .request(
                Method::POST,
                "/designs/generate",
                Some(token),
                Some(serde_json::json!({ "prompt": prompt })),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{:?}", response.body);
        response.body["design"]["id"].as_i64().unwrap()
    }

    /// Add a line to the caller's cart.
    pub async fn add_to_cart(&self, token: &str, design_id: i64, quantity: u32) -> TestResponse {
        self.request(
            Method::POST,
            "/cart",
            Some(token),
            Some(serde_json::json!({
                "design_id": design_id,
                "quantity": quantity,
                "size": "M",
                "color": "white",
            })),
        )
        .await
    }
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}

/// A valid shipping address body.
pub fn shipping_address() -> Value {
    serde_json::json!({
        "name": "Hanako Sato",
        "address": "2-3-4 Shibuya",
        "city": "Shibuya-ku, Tokyo",
        "postal_code": "150-0002",
        "country": "Japan",
    })
}
