//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: adapter wiring (verifier, guard, audit log, task store)
//! - `tasks.rs`: the in-memory task store
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request DTOs and query parameters
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router};
use tower::ServiceBuilder;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;
pub mod tasks;

pub use services::AppServices;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
///
/// Every route runs behind the authentication middleware; whether an
/// anonymous caller may proceed is decided per route by the guard.
pub fn build_app(services: AppServices) -> Router {
    let auth_state = middleware::AuthState {
        verifier: Arc::clone(&services.verifier),
    };
    let services = Arc::new(services);

    routes::router()
        .layer(Extension(services))
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            middleware::auth_middleware,
        ))
        .layer(ServiceBuilder::new())
}
