use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    // DB path: use ANIBRIDGE_DB env or default
    let db_path = std::env::var("ANIBRIDGE_DB").unwrap_or_else(|_| "anibridge.db".to_string());
    info!(db_path = %db_path, "connecting to database");

    let pool = anibridge_db::connect(&db_path)
        .await
        .context("failed to connect to database")?;

    anibridge_db::migrate::run(&pool)
        .await
        .context("failed to run migrations")?;
    info!("migrations complete");

    let tmdb_key = std::env::var("ANIBRIDGE_TMDB_KEY").unwrap_or_default();
    if tmdb_key.is_empty() {
        warn!("ANIBRIDGE_TMDB_KEY not set; id resolution will fail closed");
    }

    let bind_addr = std::env::var("ANIBRIDGE_BIND").unwrap_or_else(|_| "0.0.0.0:7700".to_string());
    let public_url = std::env::var("ANIBRIDGE_PUBLIC_URL")
        .unwrap_or_else(|_| format!("http://{bind_addr}"))
        .trim_end_matches('/')
        .to_string();
    let site_base = std::env::var("ANIBRIDGE_SITE_BASE")
        .unwrap_or_else(|_| "https://watchanimeworld.in".to_string());
    let negative_ttl_days: u64 = std::env::var("ANIBRIDGE_NEGATIVE_TTL_DAYS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(30);
    let negative_ttl = Duration::from_secs(negative_ttl_days * 24 * 3600);

    // One client, one fixed timeout, for every outbound call
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .context("failed to build HTTP client")?;

    let metadata: Arc<dyn anibridge_metadata::provider::MetadataProvider> = Arc::new(
        anibridge_metadata::tmdb::TmdbClient::new(tmdb_key, http.clone()),
    );
    let catalog: Arc<dyn anibridge_catalog::CatalogProvider> = Arc::new(
        anibridge_catalog::site::SiteClient::with_base_url(http.clone(), site_base),
    );

    let resolver = Arc::new(anibridge_resolver::Resolver::new(
        pool.clone(),
        metadata,
        catalog.clone(),
        anibridge_resolver::ResolverConfig {
            negative_ttl,
            ..Default::default()
        },
    ));

    let subtitles = Arc::new(anibridge_extractor::subtitles::SubtitleRegistry::default());
    let extractor = Arc::new(anibridge_extractor::StreamExtractor::new(
        http.clone(),
        catalog.clone(),
        subtitles.clone(),
        public_url.clone(),
    ));

    // Sweep expired failure records so retries are not gated on a lookup
    {
        let pool = pool.clone();
        let ttl_secs = negative_ttl.as_secs() as i64;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_secs(12 * 3600)).await;
                match anibridge_db::repo::negatives::purge_expired(&pool, ttl_secs).await {
                    Ok(removed) if removed > 0 => {
                        info!(removed, "purged expired failure records");
                    }
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "failure record sweep failed"),
                }
            }
        });
    }

    let app_state = anibridge_server::state::AppState {
        db: pool,
        http,
        catalog,
        resolver,
        extractor,
        subtitles,
    };

    let app = anibridge_server::routes::build_router(app_state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .context("failed to bind")?;
    info!(addr = %bind_addr, public_url = %public_url, "server listening");

    axum::serve(listener, app).await?;
    Ok(())
}
