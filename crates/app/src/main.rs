mod relay;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

fn main() {
    if let Err(err) = run() {
        eprintln!("{err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    // A local .env is a development convenience; absence is fine.
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = relay::RelayConfig::from_env()?;
    actix_web::rt::System::new().block_on(relay::serve(config))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
