//! HTTP middleware stack.
//!
//! # Middleware Order (bottom to top in Router)
//!
//! 1. Sentry layers (hub per request, HTTP transaction)
//! 2. `TraceLayer` (request span with a `request_id` field)
//! 3. Request ID (fills the span field, tags Sentry, echoes the header)
//! 4. CORS
//!
//! Admin gating is an extractor ([`RequireAdmin`]) rather than a layer.

pub mod auth;
pub mod request_id;

pub use auth::RequireAdmin;
pub use request_id::{REQUEST_ID_HEADER, request_id_middleware};
