//! Axum middleware: token validation, scope checks and request timing.
//!
//! Layer order matters. [`require_jwt`] must wrap every route that carries
//! a [`require_scope`] layer, since the scope check reads the [`Claims`] the
//! validation step leaves in the request extensions.

pub mod jwt;
pub mod scope;
pub mod timing;

pub use jwt::{bearer_token, require_jwt, Claims};
pub use scope::{require_scope, RequiredScope};
pub use timing::{request_timing, trace_layer};
