use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use relay_api::evaluator::PassthroughEvaluator;
use relay_api::handlers;
use relay_api::supervisor::Supervisor;
use relay_core::RelayConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const SHUTDOWN_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();
    init_metrics();

    let config = RelayConfig::from_env().unwrap_or_else(|error| {
        tracing::error!(%error, "invalid configuration, exiting");
        std::process::exit(1);
    });
    if let Err(error) = config.validate() {
        tracing::error!(%error, "configuration failed validation, exiting");
        std::process::exit(1);
    }

    tracing::info!(
        environments = config.environments.len(),
        listen = %format!("{}:{}", config.listen.host, config.listen.port),
        "starting flag relay"
    );

    // TODO: swap in a real flag-evaluation engine; the relay core never
    // inspects flag internals itself (evaluator.rs).
    let evaluator = Arc::new(PassthroughEvaluator);
    let supervisor = Supervisor::start(&config, evaluator)
        .await
        .unwrap_or_else(|error| {
            tracing::error!(%error, "failed to start supervisor, exiting");
            std::process::exit(1);
        });

    let bind_addr = format!("{}:{}", config.listen.host, config.listen.port);
    let server_supervisor = supervisor.clone();
    let server = HttpServer::new(move || {
        let cors = Cors::default().allow_any_origin().allow_any_method().allow_any_header().max_age(3600);

        App::new()
            .app_data(web::Data::new(server_supervisor.clone()))
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .configure(handlers::configure)
    })
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("received shutdown signal, draining environments");
        server_handle.stop(true).await;
    });

    let result = server.await;
    supervisor.shutdown(SHUTDOWN_FLUSH_TIMEOUT).await;
    result
}

/// `RUST_LOG`-driven structured logging, defaulting to `info`.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Register the Prometheus collectors served at `GET /metrics`. A no-op
/// without the `monitoring` feature.
#[cfg(feature = "monitoring")]
fn init_metrics() {
    if let Err(error) = relay_api::metrics::init_metrics() {
        tracing::warn!(%error, "failed to register prometheus metrics");
    }
}

#[cfg(not(feature = "monitoring"))]
fn init_metrics() {}
