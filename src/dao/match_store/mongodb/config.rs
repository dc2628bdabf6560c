//! Connection settings of the MongoDB match store.

use std::{env, time::Duration};

use mongodb::{Client, Database, bson::doc, options::ClientOptions};
use tokio::time::sleep;
use tracing::debug;

use super::error::{MongoDaoError, MongoResult};

const DEFAULT_DB: &str = "baby_foot";
const DEFAULT_CONNECT_ATTEMPTS: u32 = 10;
const FIRST_RETRY_DELAY: Duration = Duration::from_millis(250);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Where the match collections live and how long to wait for the server.
#[derive(Clone)]
pub struct MongoConfig {
    /// Parsed client options.
    pub options: ClientOptions,
    /// Database holding the `matches` and `score_events` collections.
    pub database_name: String,
    /// Pings attempted before connecting is given up.
    pub connect_attempts: u32,
}

impl MongoConfig {
    /// Parse `uri`; the database defaults to `baby_foot`.
    pub async fn from_uri(uri: &str, database: Option<&str>) -> MongoResult<Self> {
        let options = ClientOptions::parse(uri)
            .await
            .map_err(|source| MongoDaoError::InvalidUri {
                uri: uri.to_owned(),
                source,
            })?;

        Ok(Self {
            options,
            database_name: database.unwrap_or(DEFAULT_DB).to_owned(),
            connect_attempts: DEFAULT_CONNECT_ATTEMPTS,
        })
    }

    /// Read `MONGO_URI` (required), `MONGO_DB` and `MONGO_CONNECT_ATTEMPTS`.
    pub async fn from_env() -> MongoResult<Self> {
        let uri =
            env::var("MONGO_URI").map_err(|_| MongoDaoError::MissingEnvVar { var: "MONGO_URI" })?;
        let database = env::var("MONGO_DB").ok();

        let mut config = Self::from_uri(&uri, database.as_deref()).await?;
        if let Some(attempts) = env::var("MONGO_CONNECT_ATTEMPTS")
            .ok()
            .and_then(|value| value.parse::<u32>().ok())
        {
            config.connect_attempts = attempts.max(1);
        }
        Ok(config)
    }

    /// Open a client and wait for the database to answer a ping.
    pub(super) async fn connect(&self) -> MongoResult<(Client, Database)> {
        let client = Client::with_options(self.options.clone())
            .map_err(|source| MongoDaoError::ClientConstruction { source })?;
        let database = client.database(&self.database_name);

        let mut attempts = 0;
        let mut delay = FIRST_RETRY_DELAY;
        loop {
            attempts += 1;
            match database.run_command(doc! { "ping": 1 }).await {
                Ok(_) => return Ok((client, database)),
                Err(source) if attempts >= self.connect_attempts => {
                    return Err(MongoDaoError::InitialPing { attempts, source });
                }
                Err(err) => {
                    debug!(
                        database = %self.database_name,
                        attempts,
                        error = %err,
                        "MongoDB not answering yet"
                    );
                    sleep(delay).await;
                    delay = next_retry_delay(delay);
                }
            }
        }
    }
}

fn next_retry_delay(current: Duration) -> Duration {
    (current * 2).min(MAX_RETRY_DELAY)
}
