use std::path::PathBuf;
use std::sync::Arc;

use crate::app::error::{Result, TributaryError};
use crate::config::Config;
use crate::fetcher::http_fetcher::HttpFetcher;
use crate::fetcher::Fetcher;
use crate::store::sqlite::SqliteStore;
use crate::store::Store;

pub struct AppContext {
    pub store: Arc<dyn Store + Send + Sync>,
    pub fetcher: Arc<dyn Fetcher + Send + Sync>,
    pub config: Config,
}

impl AppContext {
    pub fn new(config: Config) -> Result<Self> {
        let db_path = match &config.database {
            Some(p) => p.clone(),
            None => Self::default_db_path()?,
        };

        let store: Arc<dyn Store + Send + Sync> = Arc::new(SqliteStore::new(&db_path)?);
        let fetcher: Arc<dyn Fetcher + Send + Sync> = Arc::new(HttpFetcher::new(
            config.fetch_timeout_secs,
            &config.user_agent,
        ));

        Ok(Self {
            store,
            fetcher,
            config,
        })
    }

    fn default_db_path() -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| TributaryError::Config("Could not find data directory".into()))?;
        let dir = data_dir.join("tributary");
        std::fs::create_dir_all(&dir)?;
        Ok(dir.join("tributary.db"))
    }
}
