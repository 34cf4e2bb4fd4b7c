//! Storefront commerce service

use std::sync::Arc;

use anyhow::Context;
use storefront::{
    api::{build_app, middleware::AuthState, AppState},
    config::AppConfig,
    feed::ChangeFeed,
    media::CdnClient,
    shop::Shop,
    store::{CommerceStore, MemoryStore, PgStore, PoolConfig},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.log_level))?;
    tracing_subscriber::registry().with(env_filter).with(tracing_subscriber::fmt::layer()).init();
    tracing::debug!(?config, "configuration loaded");

    let store: Arc<dyn CommerceStore> = match &config.database_url {
        Some(url) => {
            let pool = PoolConfig { max_connections: config.db_max_connections, ..PoolConfig::default() };
            Arc::new(PgStore::connect(url, pool).await.context("connecting to postgres")?)
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using the in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    let nats = match &config.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => Some(client),
            Err(e) => {
                tracing::warn!(error = %e, "NATS unavailable; change events stay in-process");
                None
            }
        },
        None => None,
    };

    let cdn = match &config.cdn {
        Some(cdn) => Some(
            CdnClient::with_base_url(&cdn.cloud_name, &cdn.upload_preset, cdn.timeout_secs, &cdn.base_url)?
                .with_folder(cdn.folder.clone()),
        ),
        None => {
            tracing::warn!("CDN_CLOUD_NAME not set; image uploads are disabled");
            None
        }
    };

    let shop = Shop::new(store, ChangeFeed::new(nats)).with_import_batch_size(config.import_batch_size);
    let auth = AuthState::new(config.admin_api_token.clone());
    let app = build_app(AppState { shop, cdn }, auth, config.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "storefront listening");
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
