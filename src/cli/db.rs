// src/cli/db.rs
// db migrate: apply the history store schema.

use limbodancer::config::Settings;
use limbodancer::stores::history::SqliteHistoryStore;

use super::CliError;

pub async fn run_migrate(settings: &Settings) -> Result<(), CliError> {
    let store = SqliteHistoryStore::connect(&settings.database_url)
        .await
        .map_err(|e| CliError::DependencyUnavailable(format!("history store: {e}")))?;
    store
        .migrate()
        .await
        .map_err(|e| CliError::DependencyUnavailable(format!("history store: {e}")))?;
    println!("history schema up to date ({})", settings.database_url);
    Ok(())
}
