//! # Ticket Settlement Server
//!
//! The HTTP boundary of the ticket settlement system. The engine crate owns the settlement
//! algorithms and the database; this crate owns everything that touches the network:
//!
//! * Webhook ingress for fiat and crypto payment providers, with per-tenant HMAC verification
//!   and a bounded concurrency limiter in front of the settlement flow.
//! * Checkout and callback token signing and verification.
//! * Secret-at-rest encryption for sensitive ticket answers.
//! * A TTL cache for checkout links and the expiry sweep worker that cancels stale sessions.
//!
//! Every response body is JSON. Webhook responses are always 2xx classifications so that
//! well-behaved providers do not build retry storms against us; everything else maps typed
//! [`errors::ServerError`] values to HTTP statuses.

pub mod auth;
pub mod cache;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod expiry_worker;
pub mod helpers;
pub mod middleware;
pub mod routes;
pub mod secrets;
pub mod server;
pub mod tokens;
pub mod webhook_limiter;
pub mod webhook_routes;
