use std::io::BufRead;
use std::net::SocketAddr;

use anyhow::Context;

use gatehouse_api::config::GatehouseConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // `gatehouse-api hash-password` reads a password from stdin and prints
    // its argon2 hash for the users file.
    if std::env::args().nth(1).as_deref() == Some("hash-password") {
        let mut password = String::new();
        std::io::stdin()
            .lock()
            .read_line(&mut password)
            .context("failed to read password from stdin")?;
        let hash = gatehouse_api::credentials::hash_password(password.trim_end_matches(['\r', '\n']))?;
        println!("{hash}");
        return Ok(());
    }

    let config = GatehouseConfig::from_env().context("invalid configuration")?;
    gatehouse_observability::init(config.log_format);

    let app = gatehouse_api::app::bootstrap(&config).await?;

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("server error")?;

    Ok(())
}
