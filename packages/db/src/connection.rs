//! Database connection management.

use surrealdb::Surreal;
use surrealdb::engine::any::{Any, connect};
use surrealdb::opt::auth::Root;

use crate::StoreError;

/// Database connection handle. Cheap to clone.
pub type Database = Surreal<Any>;

/// Where the job store lives and which namespace/database it uses.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// `mem://`, `rocksdb://<path>` or a remote `ws://host:port`.
    pub endpoint: String,
    pub namespace: String,
    pub database: String,
    /// Root user and password, for remote servers.
    pub credentials: Option<(String, String)>,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            endpoint: "mem://".to_string(),
            namespace: "jobqueue".to_string(),
            database: "main".to_string(),
            credentials: None,
        }
    }
}

impl DbConfig {
    /// Embedded, process-local storage. Every call gets a fresh instance.
    pub fn memory() -> Self {
        Self::default()
    }

    pub fn endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    /// Embedded on-disk storage; needs the `rocksdb` feature.
    pub fn rocksdb(path: impl Into<String>) -> Self {
        Self::endpoint(format!("rocksdb://{}", path.into()))
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }
}

/// Open a connection and select the configured namespace and database.
pub async fn connect_db(config: &DbConfig) -> Result<Database, StoreError> {
    tracing::info!("Connecting to database: {}", config.endpoint);

    let db = connect(config.endpoint.as_str()).await?;

    if let Some((username, password)) = &config.credentials {
        db.signin(Root { username, password }).await?;
    }

    db.use_ns(&config.namespace)
        .use_db(&config.database)
        .await?;

    tracing::info!(
        "Connected to database: {}/{}",
        config.namespace,
        config.database
    );

    Ok(db)
}
