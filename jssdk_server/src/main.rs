use std::sync::Arc;

use clap::Parser;
use color_eyre::eyre::WrapErr;
use jssdk_tickets::{upstream::WechatUpstream, CredentialCache, TenantRegistry};
use tracing_subscriber::EnvFilter;

mod config;
mod routes;

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    dotenvy::dotenv().ok();
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,jssdk_tickets=debug")),
        )
        .init();

    let opts = config::Opts::parse();

    let registry = TenantRegistry::from_json_file(&opts.tenants_file).wrap_err_with(|| {
        format!(
            "unable to load tenants from {}",
            opts.tenants_file.display()
        )
    })?;
    tracing::info!(tenants = registry.len(), "loaded tenant registry");

    let client = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(opts.upstream_timeout())
        .build()?;
    let upstream = WechatUpstream::new(client, opts.upstream_url.clone());

    let cache = CredentialCache::new(registry, Arc::new(upstream));
    let app = routes::router(cache, opts.static_dir.as_deref());

    let listener = tokio::net::TcpListener::bind(opts.listen)
        .await
        .wrap_err_with(|| format!("unable to listen on {}", opts.listen))?;
    tracing::info!(address = %opts.listen, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(
            error = (&error as &dyn std::error::Error),
            "unable to listen for shutdown signal"
        );
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
