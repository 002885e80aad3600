pub mod disk;
pub mod memory;

use crate::core::config::AppConfig;
use crate::core::session::SessionStore;
use anyhow::Result;
use disk::FjallSessionStore;
use std::sync::Arc;

/// Opens the on-disk session store under the configured data directory.
pub fn open_session_store(config: &AppConfig) -> Result<Arc<dyn SessionStore>> {
    let data_path = config.data_path()?;
    Ok(Arc::new(FjallSessionStore::open(&data_path)?))
}
