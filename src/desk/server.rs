use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{Router, http::HeaderValue, routing::get};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::api::{self, AppState};
use super::db::{DbHandle, DeskDb};
use super::ws::{self, Keepalive};
use crate::config::DeskConfig;

/// Configuration for the desk server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub dev_mode: bool,
    pub cors_origins: Vec<String>,
    pub seed: bool,
    pub channel_capacity: usize,
    pub keepalive: Keepalive,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from(&DeskConfig::default())
    }
}

impl From<&DeskConfig> for ServerConfig {
    fn from(config: &DeskConfig) -> Self {
        Self {
            host: config.server.host.clone(),
            port: config.server.port,
            db_path: config.database.path.clone(),
            dev_mode: config.server.dev,
            cors_origins: config.server.cors_origins.clone(),
            seed: config.database.seed,
            channel_capacity: config.realtime.channel_capacity,
            keepalive: config.keepalive(),
        }
    }
}

/// Build the full application router with API and WebSocket routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    api::api_router()
        .route("/ws", get(ws::ws_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// CORS policy: listed origins, permissive in dev mode when none are listed,
/// and no layer at all otherwise.
pub fn cors_layer(config: &ServerConfig) -> Result<Option<CorsLayer>> {
    if config.cors_origins.is_empty() {
        return Ok(config.dev_mode.then(CorsLayer::permissive));
    }
    let origins = config
        .cors_origins
        .iter()
        .map(|o| {
            HeaderValue::from_str(o).with_context(|| format!("Invalid CORS origin '{}'", o))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any),
    ))
}

/// Open the database at `path`, creating parent directories, running
/// migrations, and seeding if asked.
pub fn open_database(path: &std::path::Path, seed: bool) -> Result<DeskDb> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }
    let db = DeskDb::new(path).context("Failed to initialize desk database")?;
    if seed && db.seed_if_empty()? {
        tracing::info!("seeded starter agents and tickets");
    }
    Ok(db)
}

/// A bound but not yet serving desk server.
pub struct DeskServer {
    listener: TcpListener,
    app: Router,
}

impl DeskServer {
    /// Open storage, build the router, and bind the listener.
    pub async fn bind(config: &ServerConfig) -> Result<Self> {
        let db = open_database(&config.db_path, config.seed)?;
        let (ws_tx, _rx) = broadcast::channel::<String>(config.channel_capacity.max(1));
        let state = Arc::new(AppState::new(DbHandle::new(db), ws_tx, config.keepalive));

        let mut app = build_router(state);
        if let Some(cors) = cors_layer(config)? {
            app = app.layer(cors);
        }

        let addr = format!("{}:{}", config.host, config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind to {}", addr))?;
        Ok(Self { listener, app })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("Failed to read listener address")
    }

    /// Serve until `shutdown` resolves, then drain in-flight requests.
    pub async fn serve<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tracing::info!(addr = %self.local_addr()?, "livedesk listening");
        axum::serve(self.listener, self.app)
            .with_graceful_shutdown(shutdown)
            .await
            .context("Server error")?;
        tracing::info!("server shut down gracefully");
        Ok(())
    }
}

/// Start the desk server and run until Ctrl-C.
pub async fn start_server(config: ServerConfig) -> Result<()> {
    let server = DeskServer::bind(&config).await?;
    server.serve(shutdown_signal()).await
}

pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_router() -> Router {
        let db = DeskDb::new_in_memory().unwrap();
        let (ws_tx, _) = broadcast::channel(16);
        let state = Arc::new(AppState::new(DbHandle::new(db), ws_tx, Keepalive::default()));
        build_router(state)
    }

    #[tokio::test]
    async fn test_health_via_full_router() {
        let app = test_router();
        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_api_routes_mounted() {
        let app = test_router();
        for uri in ["/api/agents", "/api/tickets"] {
            let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
            let resp = app.clone().oneshot(req).await.unwrap();
            assert_eq!(resp.status(), StatusCode::OK, "{}", uri);
        }
    }

    #[tokio::test]
    async fn test_ws_route_requires_upgrade() {
        let app = test_router();
        let req = Request::builder().uri("/ws").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert!(resp.status().is_client_error());
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let app = test_router();
        let req = Request::builder()
            .uri("/api/nothing-here")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_api_create_agent_via_full_router() {
        let app = test_router();
        let req = Request::builder()
            .method("POST")
            .uri("/api/agents")
            .header("content-type", "application/json")
            .body(Body::from(
                serde_json::json!({"name": "Server Test", "email": "server@example.com"})
                    .to_string(),
            ))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);

        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let agent: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(agent["name"], "Server Test");
    }

    #[tokio::test]
    async fn test_cors_allows_listed_origin() {
        let config = ServerConfig {
            cors_origins: vec!["http://localhost:3000".to_string()],
            ..Default::default()
        };
        let app = test_router().layer(cors_layer(&config).unwrap().unwrap());
        let req = Request::builder()
            .uri("/health")
            .header(header::ORIGIN, "http://localhost:3000")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(
            resp.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "http://localhost:3000"
        );
    }

    #[test]
    fn test_cors_layer_selection() {
        let config = ServerConfig::default();
        assert!(cors_layer(&config).unwrap().is_none());

        let dev = ServerConfig {
            dev_mode: true,
            ..Default::default()
        };
        assert!(cors_layer(&dev).unwrap().is_some());

        let bad = ServerConfig {
            cors_origins: vec!["http://bad\norigin".to_string()],
            ..Default::default()
        };
        assert!(cors_layer(&bad).is_err());
    }

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 5080);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.db_path, PathBuf::from(".livedesk/livedesk.db"));
        assert!(!config.dev_mode);
        assert!(!config.seed);
        assert_eq!(config.channel_capacity, 256);
    }

    #[test]
    fn test_open_database_creates_parent_and_seeds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("desk.db");
        let db = open_database(&path, true).unwrap();
        assert!(path.exists());
        assert_eq!(db.count_agents().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_bind_ephemeral_port_and_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            port: 0,
            db_path: dir.path().join("desk.db"),
            ..Default::default()
        };
        let server = DeskServer::bind(&config).await.unwrap();
        let addr = server.local_addr().unwrap();
        assert_ne!(addr.port(), 0);

        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let handle = tokio::spawn(server.serve(async move {
            let _ = stop_rx.await;
        }));
        stop_tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }
}
