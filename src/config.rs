use aws_config::{BehaviorVersion, SdkConfig};
use aws_credential_types::provider::SharedCredentialsProvider;
use aws_sdk_rekognition::{
    config::{Credentials, Region},
    Client as RekognitionClient,
};
use aws_sdk_s3::Client as S3Client;
use chrono::Duration;
use log::{error, info};
use mongodb::{Client as MongoClient, Database};
use rocket::{
    fairing::{Fairing, Info, Kind},
    Build, Rocket,
};
use serde::Deserialize;

use crate::backend::Backend;
use crate::biometric::DEFAULT_FACE_SIMILARITY;
use crate::events::DEFAULT_EVENT_CAPACITY;
use crate::ledger::contract::DEFAULT_MAX_RETRIES;
use crate::model::mongodb::ensure_indexes_exist;
use crate::seed::seed_defaults;

/// Where ledger, guard, registry and results are kept.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// Process memory; everything is lost on shutdown.
    #[default]
    Memory,
    MongoDb,
}

/// How faces are compared.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BiometricKind {
    /// Byte-for-byte comparison with the enrollment image. Development only.
    #[default]
    Exact,
    /// Amazon Rekognition `CompareFaces`, with images in S3.
    Rekognition,
}

/// Application configuration, derived from `Rocket.toml` and `ROCKET_*`
/// environment variables. This struct becomes managed state and can be
/// inspected by any endpoint.
#[derive(Debug, Deserialize)]
pub struct Config {
    // non-secrets
    auth_ttl: u32,
    #[serde(default = "default_face_similarity")]
    face_similarity: f32,
    #[serde(default = "default_ledger_max_retries")]
    ledger_max_retries: u32,
    #[serde(default = "default_event_capacity")]
    event_capacity: usize,
    #[serde(default)]
    storage: StorageKind,
    #[serde(default)]
    biometrics: BiometricKind,
    #[serde(default = "default_seed")]
    seed_defaults: bool,
    // secrets
    jwt_secret: String,
    hmac_secret: String,
}

fn default_face_similarity() -> f32 {
    DEFAULT_FACE_SIMILARITY
}

fn default_ledger_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_event_capacity() -> usize {
    DEFAULT_EVENT_CAPACITY
}

fn default_seed() -> bool {
    true
}

impl Config {
    /// Valid lifetime of auth token cookies in seconds.
    pub fn auth_ttl(&self) -> Duration {
        Duration::seconds(self.auth_ttl.into())
    }

    /// Minimum Rekognition similarity (0-100) accepted as a match.
    pub fn face_similarity(&self) -> f32 {
        self.face_similarity
    }

    /// How many times a conflicted ledger transaction is re-executed.
    pub fn ledger_max_retries(&self) -> u32 {
        self.ledger_max_retries
    }

    /// Events buffered per vote event subscriber.
    pub fn event_capacity(&self) -> usize {
        self.event_capacity
    }

    pub fn storage(&self) -> StorageKind {
        self.storage
    }

    pub fn biometrics(&self) -> BiometricKind {
        self.biometrics
    }

    /// Whether default admins and candidates are installed at ignition.
    pub fn seed_defaults(&self) -> bool {
        self.seed_defaults
    }

    /// Secret key used to encrypt JWTs.
    pub fn jwt_secret(&self) -> &[u8] {
        self.jwt_secret.as_bytes()
    }

    /// Secret key used to sign HMACs.
    pub fn hmac_secret(&self) -> &[u8] {
        self.hmac_secret.as_bytes()
    }
}

/// A fairing that loads the application config and puts it in managed state.
/// This could easily be achieved using `AdHoc::config`, but is written out
/// explicitly for symmetry with the other fairings and control over error
/// messages.
pub struct ConfigFairing;

#[rocket::async_trait]
impl Fairing for ConfigFairing {
    fn info(&self) -> Info {
        Info {
            name: "Config",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Already provided, e.g. by a test harness.
        if rocket.state::<Config>().is_some() {
            return Ok(rocket);
        }

        // Load the config.
        let config = match rocket.figment().extract::<Config>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load application config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        info!(
            "Using {:?} storage and {:?} biometrics",
            config.storage, config.biometrics
        );

        // Manage the state.
        rocket = rocket.manage(config);
        Ok(rocket)
    }
}

/// Configuration for the database.
#[derive(Deserialize)]
struct DbConfig {
    // secrets
    db_uri: String,
}

/// A fairing that, when MongoDB storage is configured, connects to the
/// database, ensures the indexes exist, and places both a `Client` and a
/// `Database` into managed state.
pub struct DatabaseFairing;

#[rocket::async_trait]
impl Fairing for DatabaseFairing {
    fn info(&self) -> Info {
        Info {
            name: "MongoDB",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        let wanted = rocket
            .state::<Config>()
            .map_or(false, |config| config.storage() == StorageKind::MongoDb);
        if !wanted || rocket.state::<Backend>().is_some() {
            return Ok(rocket);
        }

        // Load the config.
        let config = match rocket.figment().extract::<DbConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load database config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        info!("Loaded database config, connecting...");
        // Construct the connection.
        let client = match MongoClient::with_uri_str(config.db_uri).await {
            Ok(client) => client,
            Err(e) => {
                error!("Failed to connect to database: {e}");
                return Err(rocket);
            }
        };
        let db = client.database(&get_database_name());

        // Ensure the required indexes exist.
        if let Err(e) = ensure_indexes_exist(&db).await {
            error!("Failed to connect to database: {e}");
            return Err(rocket);
        }
        info!("...database connection online!");

        // Manage the state.
        rocket = rocket.manage(client).manage(db);
        Ok(rocket)
    }
}

/// Get the name of the database to use (production version).
#[cfg(not(test))]
fn get_database_name() -> String {
    "evote".to_string()
}

/// Get the name of the database to use (test version).
/// Use a random name to avoid collisions between tests.
#[cfg(test)]
fn get_database_name() -> String {
    let random: u32 = rand::random();
    let db = format!("test{random}");
    info!("Using database {db}");
    db
}

/// Configuration for the AWS connection.
#[derive(Deserialize)]
struct AwsConfig {
    // non-secrets
    aws_region: String,
    aws_access_key_id: String,
    s3_bucket: String,
    // secrets
    aws_secret_access_key: String,
}

/// Clients for the AWS services behind face verification.
#[derive(Clone)]
pub struct AwsClients {
    pub s3: S3Client,
    pub rekognition: RekognitionClient,
    pub bucket: String,
}

/// A fairing that, when Rekognition biometrics are configured, loads the
/// AWS config and places [`AwsClients`] into managed state.
pub struct AwsFairing;

#[rocket::async_trait]
impl Fairing for AwsFairing {
    fn info(&self) -> Info {
        Info {
            name: "AWS Rekognition/S3",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        let wanted = rocket
            .state::<Config>()
            .map_or(false, |config| config.biometrics() == BiometricKind::Rekognition);
        if !wanted || rocket.state::<Backend>().is_some() {
            return Ok(rocket);
        }

        // Load the config.
        let config = match rocket.figment().extract::<AwsConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load AWS config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        // Construct the connection.
        let aws_config = SdkConfig::builder()
            .region(Region::new(config.aws_region))
            .credentials_provider(SharedCredentialsProvider::new(Credentials::new(
                config.aws_access_key_id,
                config.aws_secret_access_key,
                None,
                None,
                "rocket config",
            )))
            .behavior_version(BehaviorVersion::latest())
            .build();
        let clients = AwsClients {
            s3: S3Client::new(&aws_config),
            rekognition: RekognitionClient::new(&aws_config),
            bucket: config.s3_bucket,
        };
        info!("Loaded AWS config for bucket {}", clients.bucket);

        // Manage the state.
        rocket = rocket.manage(clients);
        Ok(rocket)
    }
}

/// A fairing that assembles the [`Backend`] from whatever the earlier
/// fairings placed into managed state, seeds it, and manages it.
pub struct BackendFairing;

#[rocket::async_trait]
impl Fairing for BackendFairing {
    fn info(&self) -> Info {
        Info {
            name: "Backend",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        if rocket.state::<Backend>().is_some() {
            return Ok(rocket);
        }
        match assemble_backend(&rocket).await {
            Ok(backend) => {
                info!("Backend assembled");
                Ok(rocket.manage(backend))
            }
            Err(e) => {
                error!("Failed to assemble backend: {e}");
                Err(rocket)
            }
        }
    }
}

async fn assemble_backend(rocket: &Rocket<Build>) -> Result<Backend, String> {
    let config = rocket
        .state::<Config>()
        .ok_or("application config is not loaded")?;

    let backend = match config.storage() {
        StorageKind::Memory => Backend::in_memory(config),
        StorageKind::MongoDb => {
            let client = rocket
                .state::<MongoClient>()
                .ok_or("MongoDB storage configured but no database connection")?;
            let db = rocket
                .state::<Database>()
                .ok_or("MongoDB storage configured but no database selected")?;
            Backend::with_mongodb(client.clone(), db, config)
        }
    };
    let backend = match config.biometrics() {
        BiometricKind::Exact => backend,
        BiometricKind::Rekognition => {
            let aws = rocket
                .state::<AwsClients>()
                .ok_or("Rekognition biometrics configured but no AWS clients")?;
            backend.with_rekognition(aws.clone(), config)
        }
    };

    if config.seed_defaults() {
        seed_defaults(&backend)
            .await
            .map_err(|e| format!("seeding defaults failed: {e}"))?;
    }
    Ok(backend)
}


#[cfg(test)]
mod tests {
    use rocket::figment::{providers::Serialized, Figment};

    use super::*;

    #[test]
    fn optional_keys_take_defaults() {
        let figment = Figment::new()
            .merge(Serialized::default("auth_ttl", 600))
            .merge(Serialized::default("jwt_secret", "jwt"))
            .merge(Serialized::default("hmac_secret", "hmac"));
        let config: Config = figment.extract().unwrap();

        assert_eq!(config.auth_ttl(), Duration::seconds(600));
        assert_eq!(config.face_similarity(), DEFAULT_FACE_SIMILARITY);
        assert_eq!(config.ledger_max_retries(), DEFAULT_MAX_RETRIES);
        assert_eq!(config.storage(), StorageKind::Memory);
        assert_eq!(config.biometrics(), BiometricKind::Exact);
        assert!(config.seed_defaults());
    }

    #[test]
    fn backends_are_selected_by_name() {
        let figment = Figment::new()
            .merge(Serialized::default("auth_ttl", 600))
            .merge(Serialized::default("jwt_secret", "jwt"))
            .merge(Serialized::default("hmac_secret", "hmac"))
            .merge(Serialized::default("storage", "mongodb"))
            .merge(Serialized::default("biometrics", "rekognition"));
        let config: Config = figment.extract().unwrap();

        assert_eq!(config.storage(), StorageKind::MongoDb);
        assert_eq!(config.biometrics(), BiometricKind::Rekognition);
    }

    #[test]
    fn secrets_are_required() {
        let figment = Figment::new().merge(Serialized::default("auth_ttl", 600));
        assert!(figment.extract::<Config>().is_err());
    }
}
