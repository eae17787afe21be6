//! HTTP server layer for the watermark cache.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │              GET /content/images/{path}.{jpg,png}               │
//! │                                                                 │
//! │  ┌──────────────────────────┐  ┌─────────────────────────────┐  │
//! │  │        handlers          │  │           routes            │  │
//! │  │ (requests, error → HTTP) │  │ (router config, tracing)    │  │
//! │  └──────────────────────────┘  └─────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod handlers;
pub mod routes;

pub use handlers::{
    asset_handler, error_status, health_handler, index_handler, AppState, ErrorResponse,
    HealthResponse, CACHE_STATUS_HEADER, DEFAULT_CACHE_MAX_AGE,
};
pub use routes::{create_router, RouterConfig};
