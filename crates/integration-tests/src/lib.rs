//! Integration tests for the Stitchery storefront.
//!
//! Tests drive the full axum router (extractors, error mapping, JSON
//! shapes) with `tower::ServiceExt::oneshot`, over an in-memory store. No
//! database or network is needed.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p stitchery-integration-tests
//! ```

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, StatusCode, header};
use serde_json::{Value, json};
use tower::ServiceExt;

use stitchery_storefront::config::StorefrontConfig;
use stitchery_storefront::db::{MemoryStore, Store};
use stitchery_storefront::routes;
use stitchery_storefront::services::auth::create_admin;
use stitchery_storefront::state::AppState;

/// Signing secret used by every test app.
pub const TEST_JWT_SECRET: &str = "q7Lw2Rz9Xc4Vb8Nm1Kp6Hs3Jd5Fg0Ty";

/// Password used for every account the helpers create.
pub const TEST_PASSWORD: &str = "correct horse battery";

/// An application instance over a fresh in-memory store.
#[derive(Clone)]
pub struct TestApp {
    router: Router,
    store: Arc<MemoryStore>,
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}

impl TestApp {
    #[must_use]
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let state = AppState::with_store(
            StorefrontConfig::for_testing(TEST_JWT_SECRET),
            Arc::clone(&store) as Arc<dyn Store>,
        );
        Self {
            router: routes::app(state),
            store,
        }
    }

    /// Direct access to storage, for arranging state and checking writes.
    #[must_use]
    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    #[must_use]
    pub fn get(&self, path: &str) -> Call<'_> {
        self.call(Method::GET, path)
    }

    #[must_use]
    pub fn post(&self, path: &str) -> Call<'_> {
        self.call(Method::POST, path)
    }

    #[must_use]
    pub fn patch(&self, path: &str) -> Call<'_> {
        self.call(Method::PATCH, path)
    }

    #[must_use]
    pub fn delete(&self, path: &str) -> Call<'_> {
        self.call(Method::DELETE, path)
    }

    fn call(&self, method: Method, path: &str) -> Call<'_> {
        Call {
            app: self,
            method,
            path: format!("/api/v1{path}"),
            token: None,
            session: None,
            body: None,
        }
    }

    /// Register a customer and return their access token and user id.
    ///
    /// # Panics
    ///
    /// Panics if registration or login fails.
    pub async fn customer(&self, email: &str) -> (String, String) {
        let registered = self
            .post("/auth/register")
            .json(json!({ "email": email, "name": "Test Customer", "password": TEST_PASSWORD }))
            .send()
            .await;
        assert_eq!(registered.status, StatusCode::CREATED, "{}", registered.body);
        self.customer_login(email).await
    }

    /// Create an admin directly in storage and return their access token.
    ///
    /// # Panics
    ///
    /// Panics if the admin cannot be created or cannot log in.
    pub async fn admin(&self) -> String {
        let email = "admin@stitchery.test";
        if let Err(e) = create_admin(self.store(), email, Some("Admin"), TEST_PASSWORD).await {
            panic!("failed to create admin: {e}");
        }
        self.customer_login(email).await.0
    }

    /// Log an existing account in and return its access token and user id.
    ///
    /// # Panics
    ///
    /// Panics if login fails.
    pub async fn customer_login(&self, email: &str) -> (String, String) {
        let response = self
            .post("/auth/login")
            .json(json!({ "email": email, "password": TEST_PASSWORD }))
            .send()
            .await;
        assert_eq!(response.status, StatusCode::OK, "{}", response.body);
        (
            response.str("access_token").to_owned(),
            response.body["user"]["id"].as_str().unwrap_or_default().to_owned(),
        )
    }

    /// Create a category through the API and return its id.
    ///
    /// # Panics
    ///
    /// Panics if the request fails.
    pub async fn category(&self, admin: &str, name: &str) -> String {
        let response = self
            .post("/categories")
            .token(admin)
            .json(json!({ "name": name, "description": "Test category" }))
            .send()
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
        response.str("id").to_owned()
    }

    /// Create a product through the API and return its id.
    ///
    /// # Panics
    ///
    /// Panics if the request fails.
    pub async fn product(
        &self,
        admin: &str,
        category_id: &str,
        name: &str,
        price: &str,
        stock: i32,
    ) -> String {
        let response = self
            .post("/products")
            .token(admin)
            .json(json!({
                "name": name,
                "description": "Test product",
                "price": price,
                "stock": stock,
                "categoryId": category_id,
            }))
            .send()
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
        response.str("id").to_owned()
    }

    /// Current stock of a product, read through the public API.
    ///
    /// # Panics
    ///
    /// Panics if the product cannot be read.
    pub async fn stock(&self, product_id: &str) -> i64 {
        let response = self.get(&format!("/products/{product_id}")).send().await;
        assert_eq!(response.status, StatusCode::OK, "{}", response.body);
        response.body["stock"].as_i64().unwrap_or(-1)
    }
}

/// A request being built.
pub struct Call<'a> {
    app: &'a TestApp,
    method: Method,
    path: String,
    token: Option<String>,
    session: Option<String>,
    body: Option<Value>,
}

impl Call<'_> {
    /// Send `Authorization: Bearer <token>`.
    #[must_use]
    pub fn token(mut self, token: &str) -> Self {
        self.token = Some(token.to_owned());
        self
    }

    /// Send `X-Session-Id: <session>`.
    #[must_use]
    pub fn session(mut self, session: &str) -> Self {
        self.session = Some(session.to_owned());
        self
    }

    #[must_use]
    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Run the request through the router.
    ///
    /// # Panics
    ///
    /// Panics if the request cannot be built or the router fails.
    pub async fn send(self) -> TestResponse {
        let mut builder = Request::builder().method(self.method).uri(self.path.as_str());
        if let Some(token) = &self.token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        if let Some(session) = &self.session {
            builder = builder.header("x-session-id", session);
        }
        let request = match self.body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        };
        let request = match request {
            Ok(request) => request,
            Err(e) => panic!("invalid request for {}: {e}", self.path),
        };

        let response = match self.app.router.clone().oneshot(request).await {
            Ok(response) => response,
            Err(e) => panic!("router error for {}: {e}", self.path),
        };
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = match axum::body::to_bytes(response.into_body(), usize::MAX).await {
            Ok(bytes) => bytes,
            Err(e) => panic!("unreadable body for {}: {e}", self.path),
        };
        let body = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));

        TestResponse {
            status,
            headers,
            body,
        }
    }
}

/// Status and decoded body of a response. Non-JSON bodies become a string.
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    /// A response header as text, if present.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// A top-level string field, or `""`.
    #[must_use]
    pub fn str(&self, field: &str) -> &str {
        self.body[field].as_str().unwrap_or_default()
    }
}

/// A decimal amount from JSON, where money is sent as a string.
#[must_use]
pub fn amount(value: &Value) -> f64 {
    match value {
        Value::String(s) => s.parse().unwrap_or(f64::NAN),
        other => other.as_f64().unwrap_or(f64::NAN),
    }
}
