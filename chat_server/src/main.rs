use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info};

use chat_server::cli;
use chat_server::registry::Registry;

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let args = cli::Args::parse();
    if let Err(e) = args.validate() {
        eprintln!("chat_server: {e}");
        return std::process::ExitCode::FAILURE;
    }

    if let Err(e) = chat_common::logging::init_logging() {
        eprintln!("chat_server: failed to initialize logging: {e}");
        return std::process::ExitCode::FAILURE;
    }

    if let Err(e) = run(args.port).await {
        error!(error = %e, "server exited with error");
        return std::process::ExitCode::FAILURE;
    }

    std::process::ExitCode::SUCCESS
}

async fn run(port: u16) -> Result<(), chat_common::ChatError> {
    let addr = format!("0.0.0.0:{port}");
    let listener =
        TcpListener::bind(&addr)
            .await
            .map_err(|source| chat_common::ChatError::Bind {
                addr: addr.clone(),
                source,
            })?;

    info!(%addr, "listening");

    chat_server::serve(listener, Registry::new()).await
}
