pub mod cache;
pub mod config;
pub mod error;
pub mod handlers;
pub mod health;
pub mod kv;
pub mod middleware;
pub mod observability;
pub mod rate_limit;
pub mod repository;
pub mod server;

pub use cache::{Cache, CacheError};
pub use config::{
    AppConfig, CacheConfig, FailurePolicy, HealthConfig, PostgresStorageConfig, RateLimitConfig,
    RedisConfig, ServerConfig,
};
pub use error::{ApiError, ApiResult};
pub use health::{HealthAggregator, HealthProbe, HealthReport, HealthStatus, ProbeResult};
pub use kv::{DynKvStore, KeyValueStore, KvError, MemoryStore, RedisStore, connect_kv_store};
pub use observability::init_tracing;
pub use rate_limit::{ClientIdentity, RateLimitDecision, RateLimiter};
pub use repository::{CacheTtls, CategoryRepository, EventRepository};
pub use server::{AppState, EventlyServer, ServerBuilder, build_app, serve};
