//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! Decided stream from the sniffer
//!     → chain.rs (tracing, request ID, CORS, limits, timeout)
//!     → routes.rs (handlers)
//!     → json.rs (bodies decoded incrementally, read with JsonReader)
//! ```

pub mod chain;
pub mod json;
pub mod routes;

pub use chain::{build_router, cors_layer, X_REQUEST_ID};
pub use json::{JsonBody, JsonOptions, JsonRejection};
pub use routes::demo_routes;
