#[macro_use]
extern crate rocket;

#[cfg(test)]
#[macro_use]
extern crate backend_test;

#[cfg(test)]
#[macro_use]
extern crate db_test;

use rocket::{Build, Rocket};

use crate::backend::Backend;
use crate::config::{AwsFairing, BackendFairing, Config, ConfigFairing, DatabaseFairing};
use crate::logging::LoggerFairing;

pub mod api;
pub mod backend;
pub mod biometric;
pub mod config;
pub mod error;
pub mod events;
pub mod guard;
pub mod ledger;
pub mod logging;
pub mod model;
pub mod reconcile;
pub mod registry;
pub mod results;
pub mod seed;
mod voting;

/// The server, configured from `Rocket.toml` and the environment.
pub fn build() -> Rocket<Build> {
    attach(rocket::build())
}

/// A server around an already assembled backend. The fairings see the
/// managed state and leave it alone.
pub fn rocket_for_backend(backend: Backend, config: Config) -> Rocket<Build> {
    attach(rocket::build().manage(config).manage(backend))
}

fn attach(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket
        .attach(ConfigFairing)
        .attach(DatabaseFairing)
        .attach(AwsFairing)
        .attach(BackendFairing)
        .attach(LoggerFairing)
        .mount("/", api::routes())
        .register("/", api::catchers())
}
