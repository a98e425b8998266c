use hlsget_core::logging;

mod cli;

use crate::cli::Cli;

#[tokio::main]
async fn main() {
    // Initialize logging as early as possible.
    if let Err(err) = logging::init_logging() {
        logging::init_logging_stderr();
        tracing::warn!("file logging unavailable, using stderr: {:#}", err);
    }

    // Parse CLI and run the download.
    if let Err(err) = Cli::run_from_args().await {
        eprintln!("hlsget error: {:#}", err);
        std::process::exit(1);
    }
}
