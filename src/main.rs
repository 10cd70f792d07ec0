use log::{error, info, LevelFilter};
use rocket::Error as RocketError;

/// Ignite the Voting Service, then hand it to Rocket until shutdown.
async fn run() -> Result<(), RocketError> {
    info!("Configuring voting service...");
    let rocket = civic_election::build_voting().ignite().await?;
    info!("...voting service configured!");
    // Disable rocket logging from now on.
    log4rs_dynamic_filters::DynamicLevelFilter::set("rocket", LevelFilter::Off);
    let _ = rocket.launch().await?;
    Ok(())
}

#[rocket::main]
async fn main() {
    if let Err(err) = log4rs::init_file("log4rs.yaml", log4rs_dynamic_filters::default_deserializers())
    {
        eprintln!("Failed to initialise logging: {err}");
        std::process::exit(1)
    }
    info!("Initialised logging");

    if let Err(err) = run().await {
        error!("{err}");
        error!("Critical failure, shutting down");
        std::process::exit(1)
    }
}
