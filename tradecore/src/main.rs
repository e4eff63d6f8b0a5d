use clap::Parser;
use tradecore::cli::{Cli, Command};
use tradecore::config::AppConfig;
use tradecore::error::AppError;
use tradecore::{logging, runtime};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let exit_code = match run(cli).await {
        Ok(()) => 0,
        Err(err) => {
            tracing::error!(%err, "tradecore exited with an error");
            err.exit_code()
        }
    };
    std::process::exit(exit_code);
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let config = AppConfig::load(cli.config.as_deref())?;
    logging::init(&config.log_level);

    match cli.command {
        Command::Serve { broker } => runtime::serve(&config, &broker).await,
        Command::Migrate => runtime::migrate(&config).await,
        Command::Reconcile { broker } => runtime::reconcile(&config, &broker).await,
        Command::ReplayAudit { portfolio } => runtime::replay_audit(&config, &portfolio).await,
    }
}
