//! Stitchery storefront library.
//!
//! JSON REST backend for the Stitchery shop: catalog, carts, checkout and
//! order management. Exposed as a library so the binary, the CLI and the
//! integration tests share one router and one storage layer.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
