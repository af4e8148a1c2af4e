use axum::http::{HeaderValue, Method, header};
use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use unitrack_web::push::WebhookSender;
use unitrack_web::{AppState, WebConfig, router};

fn cors(client_url: Option<&str>) -> anyhow::Result<CorsLayer> {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    Ok(match client_url {
        Some(origin) => layer.allow_origin(HeaderValue::from_str(origin.trim_end_matches('/'))?),
        None => {
            log::warn!("CLIENT_URL not set, allowing any origin");
            layer.allow_origin(Any)
        }
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug"))
        .target(env_logger::Target::Stderr)
        .write_style(env_logger::WriteStyle::Never)
        .init();

    let config = WebConfig::parse();
    let ct = tokio_util::sync::CancellationToken::new();

    let state = AppState::new(&config, WebhookSender::new()?, ct.child_token());
    let router = router(state).layer(cors(config.client_url.as_deref())?);
    let tcp_listener = tokio::net::TcpListener::bind(&config.bind_address).await?;

    log::info!(
        "Starting unitrack server on address: {} (portal: {})",
        config.bind_address,
        config.portal_url
    );

    axum::serve(tcp_listener, router)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("Failed to listen for shutdown signal: {e:?}");
            }
            log::info!("Shutting down");
            ct.cancel();
        })
        .await?;

    Ok(())
}
