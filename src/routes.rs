//! Route table and router assembly.

use axum::http::Method;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;
use tracing::info;

use crate::middleware::{request_timing, require_jwt, require_scope, trace_layer, Claims, RequiredScope};
use crate::oidc::TokenValidator;

pub const BASE_PATH: &str = "/api/v1";

/// Scope required by the products listing unless configured otherwise.
pub const DEFAULT_PRODUCTS_SCOPE: &str = "read:products";

/// Server-side settings for the router.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub products_scope: String,
    /// Upper bound on serving a single request.
    pub request_timeout: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            products_scope: DEFAULT_PRODUCTS_SCOPE.to_string(),
            request_timeout: Duration::from_secs(15),
        }
    }
}

/// One entry of the route table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteSpec {
    pub name: &'static str,
    pub method: Method,
    pub path: String,
    pub required_scope: Option<String>,
}

/// Routes served by [`build_router`], for startup logging.
pub fn route_table(config: &RouterConfig) -> Vec<RouteSpec> {
    vec![
        RouteSpec {
            name: "Index",
            method: Method::GET,
            path: "/".to_string(),
            required_scope: None,
        },
        RouteSpec {
            name: "Products",
            method: Method::GET,
            path: format!("{}/products", BASE_PATH),
            required_scope: Some(config.products_scope.clone()),
        },
    ]
}

pub fn log_routes(routes: &[RouteSpec]) {
    for route in routes {
        info!(
            name = route.name,
            method = %route.method,
            path = %route.path,
            scope = route.required_scope.as_deref().unwrap_or("-"),
            "Route registered"
        );
    }
}

/// Assemble the application.
///
/// Every matched route requires a valid token; routes with a required
/// scope additionally carry a scope layer inside the token layer.
pub fn build_router(validator: Arc<TokenValidator>, config: &RouterConfig) -> Router {
    let products_scope = RequiredScope::new(&config.products_scope);

    Router::new()
        .route("/", get(index))
        .route(
            &format!("{}/products", BASE_PATH),
            get(list_products).route_layer(from_fn_with_state(products_scope, require_scope)),
        )
        .route_layer(from_fn_with_state(validator, require_jwt))
        .layer(TimeoutLayer::new(config.request_timeout))
        .layer(trace_layer())
        .layer(from_fn(request_timing))
}

async fn index(claims: Claims) -> Json<Value> {
    Json(json!({
        "message": "Authenticated.",
        "subject": claims.subject,
        "scopes": claims.scopes().collect::<Vec<_>>(),
    }))
}

#[derive(Debug, Clone, Serialize)]
pub struct Product {
    pub id: u32,
    pub name: &'static str,
    pub price_cents: u64,
}

const PRODUCTS: &[Product] = &[
    Product {
        id: 1,
        name: "Widget",
        price_cents: 1299,
    },
    Product {
        id: 2,
        name: "Gadget",
        price_cents: 2499,
    },
    Product {
        id: 3,
        name: "Gizmo",
        price_cents: 999,
    },
];

async fn list_products() -> Json<&'static [Product]> {
    Json(PRODUCTS)
}
