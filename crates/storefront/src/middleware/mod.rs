//! HTTP middleware stack for the storefront.
//!
//! # Middleware Order (bottom to top in Router)
//!
//! 1. Sentry layers (hub per request, error capture)
//! 2. `TraceLayer` (request tracing)
//! 3. Request ID (add unique ID to each request)
//! 4. CORS (allows the `X-Session-Id` header)
//! 5. Rate limiting on `/auth` (governor)
//!
//! Authentication is not a layer: handlers take one of the extractors in
//! [`auth`].

pub mod auth;
pub mod rate_limit;
pub mod request_id;

pub use auth::{CurrentUser, Identity, RequireAdmin, RequireUser, SESSION_ID_HEADER};
pub use rate_limit::auth_rate_limiter;
pub use request_id::request_id_middleware;
