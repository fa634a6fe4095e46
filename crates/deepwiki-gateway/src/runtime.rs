use std::sync::Arc;

use deepwiki_ai::{ProviderRegistry, RetryingProvider, builtin_provider};

use crate::cache::FileWikiCache;
use crate::config::GatewayConfig;
use crate::gateway::Gateway;
use crate::retriever::{HttpRetriever, NoopRetriever, Retriever};
use crate::server::build_router;
use crate::tools::ToolContext;

/// Registers every enabled provider, each wrapped so transport failures
/// before the first fragment are retried.
pub fn build_registry(config: &GatewayConfig) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    for (id, settings) in &config.providers {
        let Some(provider) = builtin_provider(id, settings.clone()) else {
            tracing::warn!(provider = %id, "skipping unknown provider");
            continue;
        };
        registry.register(
            RetryingProvider::wrap(provider)
                .max_retries(config.transport_retry_count)
                .into_ref(),
        );
    }
    if registry.is_empty() {
        tracing::warn!("no providers enabled, ask_question will fail");
    }
    registry
}

pub fn build_gateway(config: &GatewayConfig) -> Gateway {
    let retriever: Arc<dyn Retriever> = match &config.retriever {
        Some(retriever) => Arc::new(HttpRetriever::new(&retriever.endpoint, retriever.timeout)),
        None => Arc::new(NoopRetriever),
    };
    let context = ToolContext {
        cache: Arc::new(FileWikiCache::new(config.cache_dir.clone())),
        retriever,
        providers: build_registry(config),
    };
    Gateway::new(context).event_buffer(config.event_buffer)
}

/// Serves the HTTP routes until SIGTERM or ctrl+c.
pub async fn serve_gateway(config: GatewayConfig) -> Result<(), String> {
    let gateway = Arc::new(build_gateway(&config));
    for line in startup_log_lines(&config, &gateway) {
        println!("{line}");
    }

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .map_err(|error| format!("bind gateway listener on {} failed: {error}", config.bind_addr))?;
    tracing::info!(bind = %config.bind_addr, "gateway listening");

    let app = build_router(gateway);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(error) = wait_for_shutdown_signal().await {
                tracing::warn!(error = %error, "shutdown signal handler failed");
            }
        })
        .await
        .map_err(|error| format!("gateway server stopped: {error}"))?;
    tracing::info!("gateway stopped");
    Ok(())
}

fn startup_log_lines(config: &GatewayConfig, gateway: &Gateway) -> Vec<String> {
    let providers = gateway.context().providers.ids();
    vec![
        "[gateway] starting deepwiki gateway".to_string(),
        format!("[gateway] bind: http://{}", config.bind_addr),
        "[gateway] routes: /mcp/{stream,info,ping,sse} /sse/{stream,info,ping}".to_string(),
        format!("[gateway] cache dir: {}", config.cache_dir.display()),
        format!(
            "[gateway] retriever: {}",
            config
                .retriever
                .as_ref()
                .map(|retriever| retriever.endpoint.as_str())
                .unwrap_or("none")
        ),
        format!(
            "[gateway] providers: {}",
            if providers.is_empty() {
                "none".to_string()
            } else {
                providers.join(", ")
            }
        ),
    ]
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() -> Result<(), String> {
    use tokio::signal::unix::{SignalKind, signal};
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|error| format!("register SIGTERM handler failed: {error}"))?;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> Result<(), String> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|error| format!("wait for ctrl+c failed: {error}"))?;
    Ok(())
}
