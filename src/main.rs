use election_service::{logging, Config, ElectionService};
use figment::Error as ConfigError;
use log::{error, info};
use thiserror::Error;

/// Errors that stop the service from starting.
#[derive(Debug, Error)]
enum Error {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("Failed to prepare the database: {0}")]
    Startup(#[from] election_service::Error),
}

async fn run() -> Result<(), Error> {
    info!("Loading configuration...");
    let config = Config::load()?;
    info!("Preparing database...");
    ElectionService::connect(&config).await?;
    info!(
        "...database {} ready; meetings at {}, polls at {}",
        config.database(),
        config.meeting_service_url(),
        config.voting_service_url()
    );
    Ok(())
}

#[tokio::main]
async fn main() {
    // Set up logging.
    logging::init_file("log4rs.yaml").expect("Failed to initialise logging");

    if let Err(err) = run().await {
        error!("{err}");
        error!("Critical failure, shutting down");
        std::process::exit(1)
    }
}
