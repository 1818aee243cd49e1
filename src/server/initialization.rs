// src/server/initialization.rs

//! Handles the complete server initialization process: backend construction,
//! element registry assembly, and listener binding.

use super::context::ServerContext;
use crate::config::{CacheKind, Config};
use crate::core::elements::{
    DbElement, ElementRegistry, KvElement, PageConfig, PageElement, SessionElement,
};
use crate::core::pipeline::{Pipeline, PipelineConfig};
use crate::core::purge::{PurgeHandler, VariantIndex};
use crate::core::storage::backend::CacheBackend;
use crate::core::storage::memory::InMemoryCache;
use crate::core::storage::remote::RemoteCache;
use crate::core::store::DataStore;
use crate::upstream::{Database, HttpOrigin, KvPool, Origin, PgDatabase};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tracing::info;

/// Capacity of the refresh-job queue; overflow drops jobs rather than
/// blocking the serving path.
const REFRESH_QUEUE_DEPTH: usize = 1024;

/// Initializes all server components before starting the main loop.
pub async fn setup(config: Config) -> Result<ServerContext> {
    info!("Initializing data store...");

    let cache: Arc<dyn CacheBackend> = match config.cache.kind {
        CacheKind::Internal => {
            info!(
                "CACHE_BACKEND: Using in-memory cache ({}MB budget)",
                config.memory_limit
            );
            Arc::new(InMemoryCache::new())
        }
        CacheKind::Memcache => {
            info!(
                "CACHE_BACKEND: Creating connection pool to {} ({} connections)",
                config.cache.server, config.cache.pool
            );
            let pool = Arc::new(KvPool::new(config.cache.server.as_str(), config.cache.pool));
            Arc::new(RemoteCache::new(pool))
        }
    };

    let kv = Arc::new(KvPool::new(config.backend.memcache.as_str(), 1));
    let db: Arc<dyn Database> = Arc::new(PgDatabase::connect_lazy(&config.backend.db));
    let origin: Arc<dyn Origin> = Arc::new(HttpOrigin::new(
        config.backend.appserver.as_str(),
        Duration::from_secs(config.backend.origin_timeout_secs),
    ));
    let variants = Arc::new(VariantIndex::new());

    let page = Arc::new(PageElement::new(
        origin,
        cache.clone(),
        variants.clone(),
        PageConfig {
            cache_header: config.headers.cache.clone(),
            cookies_header: config.headers.cookies.clone(),
            twice_header: config.headers.twice.clone(),
            lang_enabled: config.hash.lang_header,
            lang_default: config.hash.lang_default.clone(),
        },
    ));

    let mut registry = ElementRegistry::new();
    registry.register(page.clone());
    registry.register(Arc::new(SessionElement::new(
        db.clone(),
        cache.clone(),
        config.hash.session_cookie.clone(),
    )));
    registry.register(Arc::new(KvElement::new(kv, cache.clone())));
    registry.register(Arc::new(DbElement::new(db, cache.clone())));

    let (refresh_tx, refresh_rx) = mpsc::channel(REFRESH_QUEUE_DEPTH);
    let store = Arc::new(DataStore::new(cache, registry, refresh_tx));
    let purge = PurgeHandler::new(store.clone(), variants);
    let template = config.compiled_template()?;

    let pipeline = Arc::new(Pipeline::new(
        store.clone(),
        page,
        purge,
        template,
        PipelineConfig {
            purge_header: config.headers.purge.clone(),
            cache_header: config.headers.cache.clone(),
            twice_header: config.headers.twice.clone(),
            cookies_header: config.headers.cookies.clone(),
            rewrite_host: config.rewrite_host(),
        },
    ));

    let listener = TcpListener::bind((config.interface.as_str(), config.port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", config.interface, config.port))?;
    info!("Twice listening on {}:{}", config.interface, config.port);

    let (shutdown_tx, _) = broadcast::channel(1);

    Ok(ServerContext {
        config,
        pipeline,
        store,
        listener,
        shutdown_tx,
        background_tasks: JoinSet::new(),
        refresh_rx: Some(refresh_rx),
    })
}
