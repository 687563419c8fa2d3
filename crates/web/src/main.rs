use std::path::PathBuf;
use std::process::ExitCode;

use syncaide_web::{Server, ServerConfig};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = match std::env::args_os().nth(1).map(PathBuf::from) {
        Some(path) => match ServerConfig::load(&path) {
            Ok(config) => config,
            Err(e) => {
                error!(cause = %e, "failed to load configuration");
                return ExitCode::FAILURE;
            }
        },
        None => ServerConfig::default(),
    };

    let server = match Server::builder(config).build() {
        Ok(server) => server,
        Err(e) => {
            error!(cause = %e, "failed to start");
            return ExitCode::FAILURE;
        }
    };

    let result = server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(cause = %e, "failed to listen for ctrl-c");
            }
        })
        .await;

    match result {
        Ok(()) => {
            info!("server stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(cause = %e, "server failed");
            ExitCode::FAILURE
        }
    }
}
