#[macro_use]
extern crate rocket;

#[cfg(test)]
#[macro_use]
extern crate backend_test;

use rocket::{Build, Rocket};

use crate::config::{
    GatewayFairing, RegistryConfigFairing, RegistryStoreFairing, VotingConfigFairing,
    VotingStoreFairing,
};
use crate::logging::LoggerFairing;

pub mod api;
pub mod config;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod model;
pub mod service;
pub mod store;

/// The Voting Service, configured from `Rocket.toml` and the environment.
pub fn build_voting() -> Rocket<Build> {
    voting_rocket(rocket::build())
}

/// The Registry Service, configured from `Rocket.toml` and the environment.
pub fn build_registry() -> Rocket<Build> {
    registry_rocket(rocket::build())
}

fn voting_rocket(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket
        .mount("/", api::voting_routes())
        .register("/", catchers![error::default_catcher])
        .attach(LoggerFairing::new("voting"))
        .attach(VotingConfigFairing)
        .attach(VotingStoreFairing)
        .attach(GatewayFairing)
}

fn registry_rocket(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket
        .mount("/", api::registry_routes())
        .register("/", catchers![error::default_catcher])
        .attach(LoggerFairing::new("registry"))
        .attach(RegistryConfigFairing)
        .attach(RegistryStoreFairing)
}

#[cfg(test)]
pub(crate) const TEST_REGISTRY_KEY: &str = "test-registry-key";

/// Configuration shared by every test server.
#[cfg(test)]
fn test_figment() -> rocket::figment::Figment {
    use crate::model::api::account::LoginRequest;

    let admin = LoginRequest::example_admin();
    rocket::Config::figment()
        .merge(("log_level", "off"))
        .merge(("auth_ttl", 3600))
        .merge(("jwt_secret", "test-jwt-secret"))
        .merge(("hmac_secret", "test-hmac-secret"))
        .merge(("registry_url", "http://127.0.0.1:1"))
        .merge(("registry_timeout", 1))
        .merge(("registry_key", TEST_REGISTRY_KEY))
        .merge(("default_admin_username", admin.username))
        .merge(("default_admin_password", admin.password))
        .merge(("storage", "memory"))
        .merge(("api_key", TEST_REGISTRY_KEY))
        .merge(("voting_service_ips", ["10.0.0.5"]))
        .merge(("admin_ips", ["192.168.0.0/24", "127.0.0.1"]))
}

/// A Voting Service over the given stores and registry.
#[cfg(test)]
pub(crate) fn voting_rocket_for(
    db: store::VotingDb,
    gateway: gateway::Gateway,
) -> Rocket<Build> {
    voting_rocket(rocket::custom(test_figment()).manage(db).manage(gateway))
}

/// A Registry Service over the given store.
#[cfg(test)]
pub(crate) fn registry_rocket_for(db: store::RegistryDb) -> Rocket<Build> {
    registry_rocket(rocket::custom(test_figment()).manage(db))
}
