use color_eyre::eyre::{Result, WrapErr};
use hellosrv::common::{HelloServerTrait, ServerConfig, Variant};
use hellosrv::{HelloHandler, HelloServer};

use tracing::debug;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter("hellosrv=info")
        .init();

    let args: Vec<String> = std::env::args().collect();

    // Default to the vendored fixture if no variant is given
    let variant = match args.get(1).map(|s| s.parse::<Variant>()) {
        None => Variant::Vendored,
        Some(Ok(variant)) => variant,
        Some(Err(_)) => {
            let program = args.first().map(String::as_str).unwrap_or("hellosrv");
            eprintln!("Usage: {program} [vendored|not-vendored]");
            eprintln!("  vendored|not-vendored: Fixture variant (default: vendored)");
            eprintln!();
            eprintln!("Environment:");
            eprintln!("  PORT                      Port to listen on (default: 8080)");
            eprintln!("  HELLOSRV_ON_BIND_FAILURE  linger|exit (default: linger)");
            std::process::exit(1);
        }
    };

    let config = ServerConfig::from_env(variant).wrap_err("Failed to read configuration")?;
    debug!(address = %config.bind_addr, %variant, "Starting fixture server");

    let handler = HelloHandler::default();
    let server = HelloServer::new(config, handler);
    server.run().await.wrap_err("Failed to run fixture server")?;

    Ok(())
}
