use std::fmt::{Display, Formatter};
use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration as StdDuration;

use chrono::Duration;
use log::{error, info};
use mongodb::{Client as MongoClient, Database};
use rocket::{
    fairing::{Fairing, Info, Kind},
    Build, Rocket,
};
use serde::Deserialize;

use crate::gateway::{Gateway, HttpGateway};
use crate::model::mongodb::{ensure_registry_indexes_exist, ensure_voting_indexes_exist};
use crate::service::registration::ensure_default_admin;
use crate::store::{
    memory::{MemoryRegistryStore, MemoryVotingStore},
    mongo::{MongoRegistryStore, MongoVotingStore},
    RegistryDb, VotingDb,
};

/// Voting Service configuration, derived from `Rocket.toml` and `ROCKET_*`
/// environment variables. This struct becomes managed state.
#[derive(Deserialize)]
pub struct VotingConfig {
    // non-secrets
    auth_ttl: u32,
    registry_url: String,
    registry_timeout: u32,
    default_admin_username: String,
    // secrets
    jwt_secret: String,
    hmac_secret: String,
    registry_key: String,
    default_admin_password: String,
}

impl VotingConfig {
    /// Valid lifetime of auth token cookies in seconds.
    pub fn auth_ttl(&self) -> Duration {
        Duration::seconds(self.auth_ttl.into())
    }

    /// Base URL of the Registry Service.
    pub fn registry_url(&self) -> &str {
        &self.registry_url
    }

    /// Upper bound on every call to the Registry.
    pub fn registry_timeout(&self) -> StdDuration {
        StdDuration::from_secs(self.registry_timeout.into())
    }

    /// Secret key used to encrypt JWTs.
    pub fn jwt_secret(&self) -> &[u8] {
        self.jwt_secret.as_bytes()
    }

    /// Secret key used to hash national IDs.
    pub fn hmac_secret(&self) -> &[u8] {
        self.hmac_secret.as_bytes()
    }

    /// Shared secret presented to the Registry.
    pub fn registry_key(&self) -> &str {
        &self.registry_key
    }
}

/// Registry Service configuration. This struct becomes managed state.
#[derive(Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    voting_service_ips: Vec<AddressRange>,
    #[serde(default)]
    admin_ips: Vec<AddressRange>,
    // secrets
    api_key: String,
}

impl RegistryConfig {
    /// The shared secret every `/external` call must present.
    pub fn api_key(&self) -> &[u8] {
        self.api_key.as_bytes()
    }

    /// May this address reach the cross-service routes?
    pub fn allows_external(&self, ip: IpAddr) -> bool {
        self.allows_internal(ip) || self.voting_service_ips.iter().any(|r| r.contains(ip))
    }

    /// May this address reach the record management routes?
    pub fn allows_internal(&self, ip: IpAddr) -> bool {
        self.admin_ips.iter().any(|r| r.contains(ip))
    }
}

/// A single address or a CIDR block, e.g. `10.0.0.0/8`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct AddressRange {
    network: IpAddr,
    prefix: u8,
}

impl AddressRange {
    pub fn contains(&self, ip: IpAddr) -> bool {
        match (self.network, ip) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                prefix_matches(&net.octets(), &ip.octets(), self.prefix)
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                prefix_matches(&net.octets(), &ip.octets(), self.prefix)
            }
            (IpAddr::V4(net), IpAddr::V6(ip)) => ip
                .to_ipv4_mapped()
                .map_or(false, |ip| prefix_matches(&net.octets(), &ip.octets(), self.prefix)),
            (IpAddr::V6(_), IpAddr::V4(_)) => false,
        }
    }
}

fn prefix_matches(network: &[u8], ip: &[u8], prefix: u8) -> bool {
    let mut remaining = u32::from(prefix);
    for (net, ip) in network.iter().zip(ip) {
        if remaining == 0 {
            return true;
        }
        let bits = remaining.min(8);
        let mask = !(0xff_u8.checked_shr(bits).unwrap_or(0));
        if net & mask != ip & mask {
            return false;
        }
        remaining -= bits;
    }
    true
}

impl FromStr for AddressRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (address, prefix) = match s.split_once('/') {
            Some((address, prefix)) => (address, Some(prefix)),
            None => (s, None),
        };
        let network: IpAddr = address
            .trim()
            .parse()
            .map_err(|_| format!("invalid IP address in `{s}`"))?;
        let max = if network.is_ipv4() { 32 } else { 128 };
        let prefix = match prefix {
            Some(prefix) => prefix
                .trim()
                .parse::<u8>()
                .ok()
                .filter(|p| *p <= max)
                .ok_or_else(|| format!("invalid prefix length in `{s}`"))?,
            None => max,
        };
        Ok(Self { network, prefix })
    }
}

impl TryFrom<String> for AddressRange {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl Display for AddressRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

/// Which store backs a service.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    Mongodb,
    Memory,
}

/// Storage configuration shared by both services.
#[derive(Deserialize)]
struct StorageConfig {
    #[serde(default)]
    storage: StorageKind,
    // secrets
    db_uri: Option<String>,
}

/// Connect to MongoDB using the configured URI.
async fn connect(config: StorageConfig, db_name: &str) -> Option<(MongoClient, Database)> {
    let Some(db_uri) = config.db_uri else {
        error!("`storage = \"mongodb\"` requires `db_uri`");
        return None;
    };
    info!("Loaded database config, connecting...");
    match MongoClient::with_uri_str(db_uri).await {
        Ok(client) => {
            let db = client.database(db_name);
            Some((client, db))
        }
        Err(e) => {
            error!("Failed to connect to database: {e}");
            None
        }
    }
}

fn extract<'a, T: Deserialize<'a>>(rocket: &Rocket<Build>, what: &str) -> Option<T> {
    match rocket.figment().extract::<T>() {
        Ok(config) => Some(config),
        Err(e) => {
            error!("Failed to load {what} config");
            rocket::config::pretty_print_error(e);
            None
        }
    }
}

/// A fairing that loads the Voting Service config and puts it in managed state.
pub struct VotingConfigFairing;

#[rocket::async_trait]
impl Fairing for VotingConfigFairing {
    fn info(&self) -> Info {
        Info {
            name: "Voting config",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        match extract::<VotingConfig>(&rocket, "voting") {
            Some(config) => Ok(rocket.manage(config)),
            None => Err(rocket),
        }
    }
}

/// A fairing that opens the Voting Service store, unless one is already managed,
/// and ensures the default administrator exists.
pub struct VotingStoreFairing;

#[rocket::async_trait]
impl Fairing for VotingStoreFairing {
    fn info(&self) -> Info {
        Info {
            name: "Voting store",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        if rocket.state::<VotingDb>().is_none() {
            let Some(storage) = extract::<StorageConfig>(&rocket, "storage") else {
                return Err(rocket);
            };
            let db = match storage.storage {
                StorageKind::Memory => {
                    info!("Using in-memory voting store");
                    VotingDb::new(MemoryVotingStore::new())
                }
                StorageKind::Mongodb => {
                    let Some((client, db)) = connect(storage, &database_name("voting")).await
                    else {
                        return Err(rocket);
                    };
                    if let Err(e) = ensure_voting_indexes_exist(&db).await {
                        error!("Failed to prepare voting collections: {e}");
                        return Err(rocket);
                    }
                    info!("...database connection online!");
                    VotingDb::new(MongoVotingStore::new(client, db))
                }
            };
            rocket = rocket.manage(db);
        }

        let (Some(db), Some(config)) = (rocket.state::<VotingDb>(), rocket.state::<VotingConfig>())
        else {
            error!("Voting store fairing ran before the voting config was loaded");
            return Err(rocket);
        };
        let seeded = ensure_default_admin(
            db,
            &config.default_admin_username,
            &config.default_admin_password,
        )
        .await;
        match seeded {
            Ok(()) => Ok(rocket),
            Err(e) => {
                error!("Failed to create the default admin: {e}");
                Err(rocket)
            }
        }
    }
}

/// A fairing that connects the Voting Service to the Registry over HTTP, unless a
/// gateway is already managed.
pub struct GatewayFairing;

#[rocket::async_trait]
impl Fairing for GatewayFairing {
    fn info(&self) -> Info {
        Info {
            name: "Registry gateway",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        if rocket.state::<Gateway>().is_some() {
            return Ok(rocket);
        }
        let Some(config) = rocket.state::<VotingConfig>() else {
            error!("Gateway fairing ran before the voting config was loaded");
            return Err(rocket);
        };
        match HttpGateway::new(
            config.registry_url(),
            config.registry_key(),
            config.registry_timeout(),
        ) {
            Ok(gateway) => {
                info!("Registry gateway targets {}", config.registry_url());
                Ok(rocket.manage(Gateway::new(gateway)))
            }
            Err(e) => {
                error!("{e}");
                Err(rocket)
            }
        }
    }
}

/// A fairing that loads the Registry Service config and puts it in managed state.
pub struct RegistryConfigFairing;

#[rocket::async_trait]
impl Fairing for RegistryConfigFairing {
    fn info(&self) -> Info {
        Info {
            name: "Registry config",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        let Some(config) = extract::<RegistryConfig>(&rocket, "registry") else {
            return Err(rocket);
        };
        let allowed: Vec<_> = config
            .voting_service_ips
            .iter()
            .chain(&config.admin_ips)
            .map(ToString::to_string)
            .collect();
        info!("Registry accepts external calls from {}", allowed.join(", "));
        Ok(rocket.manage(config))
    }
}

/// A fairing that opens the Registry store, unless one is already managed.
pub struct RegistryStoreFairing;

#[rocket::async_trait]
impl Fairing for RegistryStoreFairing {
    fn info(&self) -> Info {
        Info {
            name: "Registry store",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        if rocket.state::<RegistryDb>().is_some() {
            return Ok(rocket);
        }
        let Some(storage) = extract::<StorageConfig>(&rocket, "storage") else {
            return Err(rocket);
        };
        let db = match storage.storage {
            StorageKind::Memory => {
                info!("Using in-memory registry store");
                RegistryDb::new(MemoryRegistryStore::new())
            }
            StorageKind::Mongodb => {
                let Some((_, db)) = connect(storage, &database_name("registry")).await else {
                    return Err(rocket);
                };
                if let Err(e) = ensure_registry_indexes_exist(&db).await {
                    error!("Failed to prepare registry collections: {e}");
                    return Err(rocket);
                }
                info!("...database connection online!");
                RegistryDb::new(MongoRegistryStore::new(db))
            }
        };
        Ok(rocket.manage(db))
    }
}

/// Get the name of the database to use (production version).
#[cfg(not(test))]
fn database_name(service: &str) -> String {
    service.to_string()
}

/// Get the name of the database to use (test version).
/// Use a random name to avoid collisions between tests.
#[cfg(test)]
fn database_name(service: &str) -> String {
    let random: u32 = rand::random();
    let db = format!("test-{service}-{random}");
    info!("Using database {db}");
    db
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn ranges_match_by_prefix() {
        let range: AddressRange = "10.1.0.0/16".parse().unwrap();
        assert!(range.contains(ip("10.1.200.3")));
        assert!(!range.contains(ip("10.2.0.1")));

        let range: AddressRange = "192.168.1.7".parse().unwrap();
        assert!(range.contains(ip("192.168.1.7")));
        assert!(!range.contains(ip("192.168.1.8")));
        assert!(range.contains(ip("::ffff:192.168.1.7")));

        let range: AddressRange = "172.16.0.0/12".parse().unwrap();
        assert!(range.contains(ip("172.31.255.255")));
        assert!(!range.contains(ip("172.32.0.0")));

        let any: AddressRange = "0.0.0.0/0".parse().unwrap();
        assert!(any.contains(ip("8.8.8.8")));

        let range: AddressRange = "fd00::/8".parse().unwrap();
        assert!(range.contains(ip("fd12::1")));
        assert!(!range.contains(ip("10.0.0.1")));
    }

    #[test]
    fn malformed_ranges_are_rejected() {
        for bad in ["10.0.0.0/33", "10.0.0/8", "not-an-ip", "::1/129"] {
            assert!(bad.parse::<AddressRange>().is_err(), "{bad}");
        }
    }

    #[test]
    fn admin_ips_may_also_call_external_routes() {
        let config = RegistryConfig {
            voting_service_ips: vec!["10.0.0.5".parse().unwrap()],
            admin_ips: vec!["192.168.0.0/24".parse().unwrap()],
            api_key: "key".to_string(),
        };
        assert!(config.allows_external(ip("10.0.0.5")));
        assert!(config.allows_external(ip("192.168.0.9")));
        assert!(!config.allows_internal(ip("10.0.0.5")));
        assert!(config.allows_internal(ip("192.168.0.9")));
        assert!(!config.allows_external(ip("8.8.8.8")));
    }
}
