use log::{error, info, LevelFilter};

#[rocket::main]
async fn main() {
    log4rs::init_file("log4rs.yaml", log4rs_dynamic_filters::default_deserializers())
        .expect("Failed to initialise logging");
    info!("Initialised logging");

    let rocket = match evote_backend::build().ignite().await {
        Ok(rocket) => rocket,
        Err(err) => {
            error!("{err}");
            error!("Failed to configure the ballot service, shutting down");
            std::process::exit(1)
        }
    };
    info!("Ballot service configured");

    // Rocket's own logging is noise from here on.
    log4rs_dynamic_filters::DynamicLevelFilter::set("rocket", LevelFilter::Off);
    if let Err(err) = rocket.launch().await {
        error!("{err}");
        error!("Critical failure, shutting down");
        std::process::exit(1)
    }
}
