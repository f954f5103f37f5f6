use plan_app::{run, AppConfig};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    let config = AppConfig::from_env();
    if let Err(err) = run(config).await {
        tracing::error!("planner stopped: {err:#}");
        std::process::exit(1);
    }
}
