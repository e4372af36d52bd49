use clap::Parser;
use log::{error, info};
use snake_server::config::ServerConfig;
use snake_server::network::Server;
use snake_server::BoxError;
use snake_shared::DEFAULT_PORT;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;

/// Command line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server port to listen on
    #[clap(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server = Server::bind(ServerConfig::with_port(args.port), shutdown_rx).await?;
    let server_handle = tokio::spawn(server.run());

    println!("Press Enter to stop the server");

    tokio::select! {
        _ = console_shutdown() => {
            info!("Shutdown requested from console");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    let _ = shutdown_tx.send(true);
    match server_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Server stopped with error: {}", e),
        Err(e) => error!("Server task panicked: {}", e),
    }

    Ok(())
}

/// Resolves once a line is typed on stdin. Never resolves without a console.
async fn console_shutdown() {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    match lines.next_line().await {
        Ok(Some(_)) => {}
        _ => std::future::pending::<()>().await,
    }
}
