use std::sync::Arc;

use aws_config::{BehaviorVersion, SdkConfig};
use aws_credential_types::provider::SharedCredentialsProvider;
use aws_sdk_sesv2::{
    config::{Credentials, Region},
    Client as SesClient,
};
use chrono::Duration;
use log::{error, info, warn};
use mongodb::{Client as MongoClient, Database};
use rocket::{
    fairing::{Fairing, Info, Kind},
    Build, Orbit, Rocket,
};
use serde::Deserialize;

use crate::{
    model::{
        api::EmailPolicy,
        common::{CorrelationToken, Positions},
        db::candidate::ensure_sentinels_exist,
        mongodb::{ensure_indexes_exist, Coll},
    },
    notification::{Mailer, NotificationQueue, RetryPolicy, SesMailer},
};

/// Application configuration, derived from `Rocket.toml` and `ROCKET_*`
/// environment variables. This struct becomes managed state and can be
/// inspected by any endpoint.
#[derive(Deserialize)]
pub struct Config {
    // non-secrets
    base_url: String,
    election_name: String,
    session_ttl: u32,
    email_domain: String,
    email_sender: String,
    email_retry_interval: u32,
    email_max_attempts: u32,
    // secrets
    jwt_secret: String,
    hmac_secret: String,
}

impl Config {
    /// Public origin of the site, without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// Shown in confirmation emails.
    pub fn election_name(&self) -> &str {
        &self.election_name
    }

    /// Valid lifetime of session cookies in seconds.
    pub fn session_ttl(&self) -> Duration {
        Duration::seconds(self.session_ttl.into())
    }

    /// The only domain voters may register from.
    pub fn email_domain(&self) -> &str {
        &self.email_domain
    }

    /// `From` address of confirmation emails.
    pub fn email_sender(&self) -> &str {
        &self.email_sender
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            interval: Duration::seconds(self.email_retry_interval.into()),
            max_attempts: self.email_max_attempts.max(1),
        }
    }

    /// Secret key used to sign session JWTs.
    pub fn jwt_secret(&self) -> &[u8] {
        self.jwt_secret.as_bytes()
    }

    /// Secret key used to digest email addresses.
    pub fn hmac_secret(&self) -> &[u8] {
        self.hmac_secret.as_bytes()
    }

    /// The absolute link a voter follows to confirm their email.
    pub fn confirmation_link(&self, token: CorrelationToken) -> String {
        format!("{}/confirmEmail/{token}", self.base_url())
    }
}

/// A fairing that loads the application config, the position registry and
/// the email policy, and puts them in managed state.
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
        // Load the config.
        let config = match rocket.figment().extract::<Config>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load application config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };

        // Load the positions being contested.
        let positions = match rocket.figment().extract_inner::<Positions>("positions") {
            Ok(positions) => positions,
            Err(e) => {
                error!("Failed to load positions");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        info!("Contesting {} positions", positions.len());

        let policy = match EmailPolicy::for_domain(config.email_domain()) {
            Ok(policy) => policy,
            Err(e) => {
                error!("Invalid email domain {}: {e}", config.email_domain());
                return Err(rocket);
            }
        };

        // Manage the state.
        rocket = rocket.manage(config).manage(positions).manage(policy);
        Ok(rocket)
    }
}

/// Configuration for the database.
#[derive(Deserialize)]
struct DbConfig {
    // non-secrets
    db_name: String,
    // secrets
    db_uri: String,
}

/// A fairing that loads the MongoDB config, connects to the database,
/// performs any setup necessary, and places both a `Client` and a `Database`
/// into managed state.
///
/// Must be attached after [`ConfigFairing`].
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
        let db = client.database(&config.db_name);
        info!("Using database {}", config.db_name);

        // Ensure the required indexes exist.
        if let Err(e) = ensure_indexes_exist(&db).await {
            error!("Failed to create indexes: {e}");
            return Err(rocket);
        }

        // Ensure every position offers the sentinel choices.
        let Some(positions) = rocket.state::<Positions>() else {
            error!("Positions must be loaded before the database");
            return Err(rocket);
        };
        let candidates = Coll::from_db(&db);
        let seeded = ensure_sentinels_exist(&candidates, positions).await;
        if let Err(e) = seeded {
            error!("Failed to seed sentinel candidates: {e}");
            return Err(rocket);
        }
        info!("...database connection online!");

        // Manage the state.
        rocket = rocket.manage(client).manage(db);
        Ok(rocket)
    }
}

/// Configuration for the AWS connection.
#[derive(Deserialize)]
struct AwsConfig {
    // non-secrets
    aws_region: String,
    aws_access_key_id: String,
    // secrets
    aws_secret_access_key: String,
}

/// A fairing that starts the notification queue and places it into managed
/// state, cancelling outstanding retries on shutdown.
///
/// Sends through Amazon SES unless given another [`Mailer`].
/// Must be attached after [`ConfigFairing`].
pub struct NotificationFairing {
    mailer: Option<Arc<dyn Mailer>>,
}

impl NotificationFairing {
    /// Send through Amazon SES, configured from the `aws_*` keys.
    pub fn ses() -> Self {
        Self { mailer: None }
    }

    /// Send through the given mailer instead.
    pub fn with_mailer(mailer: Arc<dyn Mailer>) -> Self {
        Self {
            mailer: Some(mailer),
        }
    }
}

#[rocket::async_trait]
impl Fairing for NotificationFairing {
    fn info(&self) -> Info {
        Info {
            name: "Notifications",
            kind: Kind::Ignite | Kind::Shutdown,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        let Some(config) = rocket.state::<Config>() else {
            error!("Config must be loaded before notifications");
            return Err(rocket);
        };
        let policy = config.retry_policy();
        let sender = config.email_sender().to_string();

        let mailer = match &self.mailer {
            Some(mailer) => mailer.clone(),
            None => {
                // Load the config.
                let aws = match rocket.figment().extract::<AwsConfig>() {
                    Ok(aws) => aws,
                    Err(e) => {
                        error!("Failed to load AWS config");
                        rocket::config::pretty_print_error(e);
                        return Err(rocket);
                    }
                };
                // Construct the connection.
                let aws_config = SdkConfig::builder()
                    .region(Region::new(aws.aws_region))
                    .credentials_provider(SharedCredentialsProvider::new(Credentials::new(
                        aws.aws_access_key_id,
                        aws.aws_secret_access_key,
                        None,
                        None,
                        "rocket config",
                    )))
                    .behavior_version(BehaviorVersion::latest())
                    .build();
                info!("Loaded Amazon SES config");
                Arc::new(SesMailer::new(SesClient::new(&aws_config), sender))
            }
        };

        // Manage the state.
        rocket = rocket.manage(NotificationQueue::start(mailer, policy));
        Ok(rocket)
    }

    async fn on_shutdown(&self, rocket: &Rocket<Orbit>) {
        if let Some(queue) = rocket.state::<NotificationQueue>() {
            let dropped = queue.shutdown().await;
            if dropped > 0 {
                warn!("Dropped {dropped} pending confirmation email retries");
            }
        }
    }
}
