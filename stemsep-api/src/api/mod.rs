//! HTTP API handlers for stemsep-api
//!
//! - `GET /` and `GET /health`: liveness
//! - `POST /separate`: upload and separate one file
//! - `GET /output/...`: stem retrieval (static, mounted in `build_router`)

pub mod health;
pub mod separate;

pub use health::health_routes;
pub use separate::separate_routes;
