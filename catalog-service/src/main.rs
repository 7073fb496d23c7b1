use std::net::SocketAddr;
use std::sync::Arc;

use common_auth::{JwtConfig, TokenVerifier};
use sqlx::PgPool;
use tokio::net::TcpListener;

use catalog_service::app::{router, AppState};
use catalog_service::config::load_config;
use catalog_service::metrics::ServiceMetrics;
use catalog_service::tokens::TokenSigner;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let config = load_config()?;

    let db = PgPool::connect(&config.database_url).await?;

    let verifier = Arc::new(TokenVerifier::new(JwtConfig::new(
        config.token_secret.clone(),
    )));
    let signer = Arc::new(TokenSigner::new(&config.token_secret));
    let metrics = Arc::new(ServiceMetrics::new()?);

    let state = AppState {
        db,
        verifier,
        signer,
        metrics,
    };

    let app = router(state);

    let ip: std::net::IpAddr = config.host.parse()?;
    let addr = SocketAddr::from((ip, config.port));

    println!("starting catalog-service on {addr}");
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
