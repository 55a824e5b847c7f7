//! External service clients/adapters.

pub mod jwks_http;

pub use jwks_http::HttpJwksSource;
