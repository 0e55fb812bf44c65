//! larkmd Server - HTTP API for the options surface.
//!
//! ## Endpoints
//!
//! - `GET /api/domains` - Built-in and custom domains
//! - `POST /api/domains` - Add a custom domain (permission-gated)
//! - `DELETE /api/domains/{domain}` - Remove a custom domain
//! - `GET /api/patterns` - Match patterns for all supported domains
//! - `GET /api/check?url=` - Whether a URL is supported
//!
//! ## Example
//!
//! ```no_run
//! use larkmd_server::{AppState, Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let server = Server::new(ServerConfig::default(), AppState::in_memory()).unwrap();
//!     server.run().await.unwrap();
//! }
//! ```

pub mod error;
mod handlers;
pub mod models;
pub mod state;

use std::net::SocketAddr;

use axum::routing::{delete, get};
use axum::Router;
use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

pub use error::{ApiError, Result};
pub use state::AppState;

/// Default server port.
pub const DEFAULT_PORT: u16 = 8767;

/// Default server host (localhost only).
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host to bind to (default: 127.0.0.1).
    pub host: String,
    /// Port to bind to (default: 8767).
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl ServerConfig {
    /// Creates a config from a bind address.
    pub fn from_addr(addr: SocketAddr) -> Self {
        Self {
            host: addr.ip().to_string(),
            port: addr.port(),
        }
    }
}

/// Server error types.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to address.
    #[error("failed to bind to {0}: {1}")]
    BindError(SocketAddr, std::io::Error),

    /// Server runtime error.
    #[error("server error: {0}")]
    Runtime(String),
}

/// Builds the API router over `state`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/domains",
            get(handlers::list_domains).post(handlers::add_domain),
        )
        .route("/api/domains/{domain}", delete(handlers::remove_domain))
        .route("/api/patterns", get(handlers::get_patterns))
        .route("/api/check", get(handlers::check_url))
        .with_state(state)
}

/// The HTTP API server.
pub struct Server {
    router: Router,
    addr: SocketAddr,
}

impl Server {
    /// Creates a server over `state`.
    pub fn new(config: ServerConfig, state: AppState) -> std::result::Result<Self, ServerError> {
        // The options page is served from the extension origin
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        let router = router(state).layer(cors);

        let addr = format!("{}:{}", config.host, config.port)
            .parse()
            .map_err(|e| ServerError::Runtime(format!("invalid address: {}", e)))?;

        Ok(Self { router, addr })
    }

    /// Returns the server address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Runs the server until shutdown.
    pub async fn run(self) -> std::result::Result<(), ServerError> {
        info!("Starting larkmd API server on {}", self.addr);

        let domain = if self.addr.is_ipv6() {
            Domain::IPV6
        } else {
            Domain::IPV4
        };
        let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))
            .map_err(|e| ServerError::BindError(self.addr, e))?;

        // Allow address reuse (helps with TIME_WAIT sockets after a restart)
        socket
            .set_reuse_address(true)
            .map_err(|e| ServerError::BindError(self.addr, e))?;

        socket
            .bind(&self.addr.into())
            .map_err(|e| ServerError::BindError(self.addr, e))?;
        socket
            .listen(128)
            .map_err(|e| ServerError::BindError(self.addr, e))?;
        socket
            .set_nonblocking(true)
            .map_err(|e| ServerError::BindError(self.addr, e))?;

        let std_listener: std::net::TcpListener = socket.into();
        let listener = tokio::net::TcpListener::from_std(std_listener)
            .map_err(|e| ServerError::BindError(self.addr, e))?;

        axum::serve(listener, self.router)
            .await
            .map_err(|e| ServerError::Runtime(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::response::Response;
    use larkmd_core::{DomainRegistry, FixedPermissions, MemoryStorage, BUILTIN_DOMAINS};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn create_test_app() -> Router {
        router(AppState::in_memory())
    }

    async fn body_json(response: Response) -> Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn add_request(domain: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/domains")
            .header("content-type", "application/json")
            .body(Body::from(json!({ "domain": domain }).to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_list_domains_initially_builtin_only() {
        let app = create_test_app();

        let request = Request::builder()
            .uri("/api/domains")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["builtin"].as_array().unwrap().len(), BUILTIN_DOMAINS.len());
        assert!(json["custom"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_add_then_list() {
        let app = create_test_app();

        let response = app
            .clone()
            .oneshot(add_request(" Wiki.Example.com "))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({ "success": true }));

        let request = Request::builder()
            .uri("/api/domains")
            .body(Body::empty())
            .unwrap();
        let json = body_json(app.oneshot(request).await.unwrap()).await;
        assert_eq!(json["custom"], json!(["wiki.example.com"]));
    }

    #[tokio::test]
    async fn test_add_rejections_are_ok_responses() {
        let app = create_test_app();

        let response = app.clone().oneshot(add_request("feishu.cn")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({ "success": false, "reason": "already_builtin" })
        );

        let response = app
            .clone()
            .oneshot(add_request("https://example.com"))
            .await
            .unwrap();
        assert_eq!(
            body_json(response).await,
            json!({ "success": false, "reason": "invalid_format" })
        );
    }

    #[tokio::test]
    async fn test_add_permission_denied() {
        let state = AppState::new(Arc::new(DomainRegistry::new(
            Arc::new(MemoryStorage::new()),
            Arc::new(FixedPermissions::denying()),
        )));
        let app = router(state);

        let response = app.oneshot(add_request("example.com")).await.unwrap();
        assert_eq!(
            body_json(response).await,
            json!({ "success": false, "reason": "permission_denied" })
        );
    }

    #[tokio::test]
    async fn test_add_malformed_body() {
        let app = create_test_app();

        let request = Request::builder()
            .method("POST")
            .uri("/api/domains")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"name": "example.com"}"#))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["code"], "bad_request");
    }

    #[tokio::test]
    async fn test_remove_domain() {
        let app = create_test_app();
        app.clone().oneshot(add_request("example.com")).await.unwrap();

        let remove = || {
            Request::builder()
                .method("DELETE")
                .uri("/api/domains/example.com")
                .body(Body::empty())
                .unwrap()
        };

        let response = app.clone().oneshot(remove()).await.unwrap();
        assert_eq!(body_json(response).await, json!({ "success": true }));

        let response = app.oneshot(remove()).await.unwrap();
        assert_eq!(
            body_json(response).await,
            json!({ "success": false, "reason": "not_found" })
        );
    }

    #[tokio::test]
    async fn test_patterns() {
        let app = create_test_app();
        app.clone().oneshot(add_request("example.com")).await.unwrap();

        let request = Request::builder()
            .uri("/api/patterns")
            .body(Body::empty())
            .unwrap();
        let json = body_json(app.oneshot(request).await.unwrap()).await;
        let patterns = json.as_array().unwrap();

        assert_eq!(patterns.len(), 2 * BUILTIN_DOMAINS.len() + 2);
        assert_eq!(patterns[0], "https://feishu.cn/*");
        assert_eq!(patterns[patterns.len() - 1], "https://*.example.com/*");
    }

    #[tokio::test]
    async fn test_check_url() {
        let app = create_test_app();
        app.clone().oneshot(add_request("example.com")).await.unwrap();

        let check = |url: &str| {
            Request::builder()
                .uri(format!("/api/check?url={}", url))
                .body(Body::empty())
                .unwrap()
        };

        let json = body_json(
            app.clone()
                .oneshot(check("https%3A%2F%2Fdocs.example.com%2Fdocx%2F1"))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(json["supported"], true);
        assert_eq!(json["custom"], true);
        assert_eq!(json["url"], "https://docs.example.com/docx/1");

        let json = body_json(
            app.clone()
                .oneshot(check("https%3A%2F%2Fabc.feishu.cn%2Fwiki%2F2"))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(json["supported"], true);
        assert_eq!(json["custom"], false);

        let response = app.oneshot(check("")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
