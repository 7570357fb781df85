use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::FromRef,
    middleware,
    routing::{get, post},
};
use puzzlequota_auth::{
    AuthState, ClientCredentialsProvider, CustomDataClient, HttpIdentityResolver,
    NoOpPrincipalCache, PrincipalCache, build_http_client,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::cache::KvPrincipalCache;
use crate::config::{AppConfig, ServerConfig};
use crate::quota::{CustomDataCounter, DurableCounter, QuotaStore};
use crate::reconcile::Reconciler;
use crate::{create_cache_backend, handlers, middleware as app_middleware};

/// Interval of the local cache eviction sweep.
const CACHE_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Shared state for all routes.
#[derive(Clone)]
pub struct AppState {
    pub auth: AuthState,
    pub quota: Arc<QuotaStore>,
}

impl FromRef<AppState> for AuthState {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

impl FromRef<AppState> for Arc<QuotaStore> {
    fn from_ref(state: &AppState) -> Self {
        state.quota.clone()
    }
}

impl AppState {
    /// Wires every component from configuration.
    ///
    /// Must be called inside a Tokio runtime: it starts the reconcile worker
    /// and the local cache sweep.
    pub async fn from_config(cfg: &AppConfig) -> anyhow::Result<Self> {
        let identity = &cfg.identity;

        let cache = create_cache_backend(&cfg.redis).await;
        let _ = cache.spawn_cleanup_task(CACHE_CLEANUP_INTERVAL);

        let http_client = build_http_client(identity)?;
        let resolver = Arc::new(HttpIdentityResolver::from_config(
            http_client.clone(),
            identity,
        )?);
        let tokens = Arc::new(ClientCredentialsProvider::from_config(
            http_client.clone(),
            identity,
        )?);
        let custom_data = CustomDataClient::from_config(http_client, identity, tokens)?;

        let durable: Arc<dyn DurableCounter> = Arc::new(CustomDataCounter::new(
            custom_data,
            cfg.quota.field.clone(),
        ));
        let reconciler = Reconciler::spawn(durable.clone(), cfg.reconcile.clone());

        let principal_cache: Arc<dyn PrincipalCache> = if identity.principal_cache_enabled {
            Arc::new(KvPrincipalCache::new(cache.clone()))
        } else {
            tracing::info!("Principal cache disabled");
            Arc::new(NoOpPrincipalCache)
        };

        let auth = AuthState::new(resolver, principal_cache)
            .with_principal_ttl(identity.principal_cache_ttl)
            .with_distinguish_upstream_errors(identity.distinguish_upstream_errors);

        let quota = Arc::new(QuotaStore::new(
            cache,
            durable,
            reconciler,
            cfg.quota.clone(),
        ));

        Ok(Self { auth, quota })
    }
}

pub fn build_app(cfg: &ServerConfig, state: AppState) -> Router {
    let routes = Router::new()
        // Health and info endpoints
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        // Protected endpoints
        .route("/me", get(handlers::me))
        .route("/quota", get(handlers::get_quota))
        .route("/quota/use", post(handlers::use_quota))
        .route("/quota/add", post(handlers::add_quota))
        .fallback(handlers::not_found)
        .with_state(state);

    with_middleware(routes, cfg.body_limit_bytes)
}

/// Wraps `routes` in the shared middleware stack.
///
/// Outermost first: body limit, request id, trace, cors. The request id
/// runs before the trace span is created so the span can record it.
fn with_middleware(routes: Router, body_limit: usize) -> Router {
    routes
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    use tracing::field::Empty;
                    let req_id = req
                        .extensions()
                        .get::<axum::http::HeaderValue>()
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("")
                        .to_string();
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri().path(),
                        http.status_code = Empty,
                        request_id = %req_id
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: Duration,
                     span: &tracing::Span| {
                        span.record(
                            "http.status_code",
                            tracing::field::display(res.status().as_u16()),
                        );
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
        .layer(middleware::from_fn(app_middleware::request_id))
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
}

pub struct PuzzlequotaServer {
    addr: SocketAddr,
    app: Router,
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
    state: Option<AppState>,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
            state: None,
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    /// Uses pre-built state instead of wiring it from configuration.
    pub fn with_state(mut self, state: AppState) -> Self {
        self.state = Some(state);
        self
    }

    pub async fn build(self) -> anyhow::Result<PuzzlequotaServer> {
        let state = match self.state {
            Some(state) => state,
            None => AppState::from_config(&self.config).await?,
        };
        let app = build_app(&self.config.server, state);

        Ok(PuzzlequotaServer {
            addr: self.addr,
            app,
        })
    }
}

impl PuzzlequotaServer {
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        self.serve(listener, shutdown_signal()).await
    }

    /// Serves on an already bound listener until `shutdown` resolves.
    pub async fn serve<F>(self, listener: tokio::net::TcpListener, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tracing::info!("listening on {}", listener.local_addr()?);
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown)
            .await?;
        Ok(())
    }
}

async fn shutdown_signal() {
    // Wait for Ctrl+C
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
