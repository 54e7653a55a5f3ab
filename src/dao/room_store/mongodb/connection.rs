use std::time::Duration;

use mongodb::{Client, Database, bson::doc, options::ClientOptions};
use tokio::time::sleep;
use tracing::{debug, info};

use super::error::{MongoDaoError, MongoResult};

/// Pings spent on a single dial. The storage supervisor retries whole dials on top of this.
const DIAL_ATTEMPTS: u32 = 4;
const FIRST_BACKOFF: Duration = Duration::from_millis(200);
const MAX_BACKOFF: Duration = Duration::from_secs(2);

/// Round-trip a `ping` command against `database`.
pub async fn ping(database: &Database) -> Result<(), mongodb::error::Error> {
    database.run_command(doc! { "ping": 1 }).await.map(|_| ())
}

/// Build a client for the room database and wait until the server answers.
pub async fn dial(options: &ClientOptions, database_name: &str) -> MongoResult<(Client, Database)> {
    let client = Client::with_options(options.clone())
        .map_err(|source| MongoDaoError::ClientConstruction { source })?;
    let database = client.database(database_name);

    let mut backoff = FIRST_BACKOFF;
    let mut attempt = 1;
    loop {
        match ping(&database).await {
            Ok(()) => {
                info!(database = database_name, attempt, "room database reachable");
                return Ok((client, database));
            }
            Err(source) if attempt >= DIAL_ATTEMPTS => {
                return Err(MongoDaoError::InitialPing {
                    attempts: attempt,
                    source,
                });
            }
            Err(err) => {
                debug!(database = database_name, attempt, error = %err, "room database ping failed");
                sleep(backoff).await;
                backoff = (backoff * 2).min(MAX_BACKOFF);
                attempt += 1;
            }
        }
    }
}
