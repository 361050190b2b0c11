use std::process::ExitCode;

use clap::Parser;
use overdraft_ledger::application::AppError;
use overdraft_ledger::cli::Cli;
use overdraft_ledger::domain::ErrorKind;
use tracing::Level;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::WARN })
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match cli.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            // Rejections keep their class visible to scripts.
            match err.downcast_ref::<AppError>().and_then(AppError::ledger_kind) {
                Some(ErrorKind::AccessRule) => ExitCode::from(2),
                Some(ErrorKind::StateConflict) => ExitCode::from(3),
                None => ExitCode::FAILURE,
            }
        }
    }
}
