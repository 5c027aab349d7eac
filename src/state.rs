use std::sync::Arc;

use crate::config::AppConfig;
use crate::db::Connector;
use crate::users::{repo::PgUserRepository, CredentialStore};

#[derive(Clone)]
pub struct AppState {
    pub store: CredentialStore,
    pub connector: Connector,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);
        let connector = Connector::new(&config.database_url)?;
        let store = CredentialStore::new(Arc::new(PgUserRepository::new(connector.clone())));
        Ok(Self::from_parts(store, connector, config))
    }

    pub fn from_parts(store: CredentialStore, connector: Connector, config: Arc<AppConfig>) -> Self {
        Self {
            store,
            connector,
            config,
        }
    }
}
