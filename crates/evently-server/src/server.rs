use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    http::HeaderName,
    middleware,
    routing::get,
};
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer,
};

use evently_storage::{DynCategoryStore, DynEventStore};

use crate::cache::Cache;
use crate::config::{AppConfig, StorageBackend};
use crate::health::{DatabaseProbe, DiskProbe, HealthAggregator, KvStoreProbe, MemoryProbe};
use crate::kv::{DynKvStore, connect_kv_store};
use crate::rate_limit::{RateLimitState, RateLimiter, rate_limit};
use crate::repository::{CacheTtls, CategoryRepository, EventRepository};
use crate::{handlers, middleware as app_middleware};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub events: EventRepository,
    pub categories: CategoryRepository,
    pub health: Arc<HealthAggregator>,
    /// `None` when rate limiting is disabled.
    pub rate_limit: Option<RateLimitState>,
}

impl AppState {
    /// Wires repositories, the limiter and the aggregator around existing stores.
    ///
    /// Registers the key-value, memory and disk probes; relational probes are
    /// backend specific and registered by the caller.
    pub async fn assemble(
        cfg: &AppConfig,
        events: DynEventStore,
        categories: DynCategoryStore,
        kv: DynKvStore,
    ) -> Self {
        let cache = Cache::new(kv.clone(), Duration::from_secs(cfg.cache.default_ttl_secs));
        let ttls = CacheTtls {
            item: Duration::from_secs(cfg.cache.item_ttl_secs),
            list: Duration::from_secs(cfg.cache.list_ttl_secs),
        };

        let health = Arc::new(HealthAggregator::new(
            env!("CARGO_PKG_VERSION"),
            cfg.health.timeout(),
        ));
        health
            .register(Arc::new(KvStoreProbe::new(kv.clone(), cfg.health.probe_timeout())))
            .await;
        health.register(Arc::new(MemoryProbe::new())).await;
        health
            .register(Arc::new(DiskProbe::new(
                cfg.health.disk_path.clone(),
                cfg.health.disk_min_free_ratio,
            )))
            .await;

        let rate_limit = cfg.rate_limit.enabled.then(|| RateLimitState {
            limiter: RateLimiter::from_config(kv, &cfg.rate_limit),
            trust_proxy_headers: cfg.rate_limit.trust_proxy_headers,
        });

        Self {
            events: EventRepository::new(events, cache.clone(), ttls),
            categories: CategoryRepository::new(categories, cache, ttls),
            health,
            rate_limit,
        }
    }

    /// Connects the configured relational backend and key-value store.
    pub async fn from_config(cfg: &AppConfig) -> anyhow::Result<Self> {
        let kv = connect_kv_store(&cfg.redis).await;

        match cfg.storage.backend {
            StorageBackend::Memory => {
                tracing::info!("Using in-memory relational store");
                let storage = evently_db_memory::create_storage();
                Ok(Self::assemble(cfg, storage.clone(), storage, kv).await)
            }
            StorageBackend::Postgres => {
                let pg = cfg.storage.postgres.as_ref().ok_or_else(|| {
                    anyhow::anyhow!("storage.postgres section is required for the postgres backend")
                })?;
                let storage =
                    Arc::new(evently_db_postgres::PostgresStorage::new(pg.to_pool_config()).await?);
                let pool = storage.pool().clone();
                tracing::info!(
                    url = %evently_db_postgres::mask_password(&pg.connection_url()),
                    "Using PostgreSQL relational store"
                );

                let state = Self::assemble(cfg, storage.clone(), storage, kv).await;
                state
                    .health
                    .register(Arc::new(DatabaseProbe::new(pool, cfg.health.probe_timeout())))
                    .await;
                Ok(state)
            }
        }
    }
}

pub fn build_app(cfg: &AppConfig, state: AppState) -> Router {
    let mut api = Router::new()
        .route(
            "/events",
            get(handlers::list_events).post(handlers::create_event),
        )
        .route("/events/search", get(handlers::search_events))
        .route(
            "/events/{id}",
            get(handlers::get_event)
                .put(handlers::update_event)
                .delete(handlers::delete_event),
        )
        .route(
            "/categories",
            get(handlers::list_categories).post(handlers::create_category),
        )
        .route(
            "/categories/{id}",
            get(handlers::get_category)
                .put(handlers::update_category)
                .delete(handlers::delete_category),
        );

    // Health routes stay outside the quota
    if let Some(limiter) = state.rate_limit.clone() {
        api = api.layer(middleware::from_fn_with_state(limiter, rate_limit));
    }

    let health = Router::new()
        .route("/health", get(handlers::health))
        .route("/health/readiness", get(handlers::readiness))
        .route("/health/liveness", get(handlers::liveness));

    let principal_header = HeaderName::try_from(cfg.auth.principal_header.as_str())
        .unwrap_or_else(|_| HeaderName::from_static("x-authenticated-user"));

    Router::new()
        .nest("/api/v1", api.merge(health))
        .with_state(state)
        // Outermost last: request id -> principal -> cors/compression/trace -> timeout -> body limit
        .layer(axum::extract::DefaultBodyLimit::max(cfg.server.body_limit_bytes))
        .layer(TimeoutLayer::new(cfg.request_timeout()))
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
                        http.target = %req.uri(),
                        http.status_code = Empty,
                        request_id = %req_id
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>, latency: Duration, span: &tracing::Span| {
                        span.record("http.status_code", res.status().as_u16());
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(middleware::from_fn_with_state(
            principal_header,
            app_middleware::resolve_principal,
        ))
        .layer(middleware::from_fn(app_middleware::request_id))
}

pub struct EventlyServer {
    addr: SocketAddr,
    app: Router,
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
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

    pub async fn build(self) -> anyhow::Result<EventlyServer> {
        self.config
            .validate()
            .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;
        let state = AppState::from_config(&self.config).await?;
        let app = build_app(&self.config, state);

        Ok(EventlyServer {
            addr: self.addr,
            app,
        })
    }
}

impl EventlyServer {
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        serve(listener, self.app, shutdown_signal()).await
    }
}

/// Serves `app` with peer addresses available to the rate limiter.
pub async fn serve<F>(
    listener: tokio::net::TcpListener,
    app: Router,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
