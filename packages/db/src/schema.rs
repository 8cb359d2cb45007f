//! Database schema definitions using SurrealQL.

use crate::{Database, StoreError};

/// Initialize the database schema.
pub async fn init_schema(db: &Database) -> Result<(), StoreError> {
    tracing::info!("Initializing database schema...");

    db.query(JOB_SCHEMA).await?.check()?;

    tracing::info!("Database schema initialized");

    Ok(())
}

/// Job table schema.
///
/// Timestamps round-trip through serde as RFC 3339 strings, so the table
/// stays schemaless and only the lookup fields are indexed.
const JOB_SCHEMA: &str = r#"
DEFINE TABLE IF NOT EXISTS job SCHEMALESS;

DEFINE INDEX IF NOT EXISTS job_status ON job FIELDS status;
DEFINE INDEX IF NOT EXISTS job_type ON job FIELDS job_type;
DEFINE INDEX IF NOT EXISTS job_status_type ON job FIELDS status, job_type;
"#;
