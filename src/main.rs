use std::net::SocketAddr;

use clap::Parser;
use tracing::{error, info};
use wellvantage::cli::{
    Args, build_config, init_logging, load_jwt_secrets, open_database, validate_client_url,
};
use wellvantage::{create_app, init_cleanup};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    init_logging(&args.log_format);

    let Some((access_secret, refresh_secret)) = load_jwt_secrets(&args) else {
        std::process::exit(1);
    };

    let Some(client_url) = validate_client_url(&args.client_url, args.production) else {
        std::process::exit(1);
    };

    let Some(db) = open_database(&args.database).await else {
        std::process::exit(1);
    };

    let Some(config) = build_config(&args, db, client_url, access_secret, refresh_secret) else {
        std::process::exit(1);
    };

    init_cleanup(&config).await;

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            error!(address = %addr, error = %e, "Failed to bind");
            std::process::exit(1);
        });

    let app = create_app(&config);

    match listener.local_addr() {
        Ok(local_addr) => info!(address = %local_addr, production = args.production, "Listening"),
        Err(e) => error!(error = %e, "Failed to read local address"),
    }

    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    if let Err(e) = axum::serve(listener, make_service).await {
        error!(error = %e, "Server error");
        std::process::exit(1);
    }
}
