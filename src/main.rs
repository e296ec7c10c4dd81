use clap::Parser;
use dotenvy::dotenv;
use feedrelay::feed::HttpFeedFetcher;
use feedrelay::observability::init_logging;
use feedrelay::telegram::TelegramTransport;
use feedrelay::transport::ChatTransport;
use feedrelay::{load_config, App};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// CLI options
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML config file, created with defaults if missing
    #[clap(long, default_value = "config.toml")]
    config: PathBuf,

    /// Print the effective config and exit
    #[clap(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();
    let args = Args::parse();

    let config = match load_config(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    if args.print_config {
        return match config.to_toml() {
            Ok(rendered) => {
                print!("{rendered}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("{e}");
                ExitCode::FAILURE
            }
        };
    }

    if let Err(e) = init_logging(&config.general) {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }

    let fetcher = match HttpFeedFetcher::new(config.fetch_timeout()) {
        Ok(fetcher) => Arc::new(fetcher),
        Err(e) => {
            log::error!("Failed to build HTTP client: {e}");
            return ExitCode::FAILURE;
        }
    };

    let telegram = config.telegram();
    let app = App::build(&config, fetcher, move |known| {
        Arc::new(TelegramTransport::new(telegram, known)) as Arc<dyn ChatTransport>
    })
    .await;

    let token = CancellationToken::new();
    tokio::spawn(shutdown_signal(token.clone()));

    app.run(token).await;
    ExitCode::SUCCESS
}

async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                log::error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("Shutting down");
    token.cancel();
}
