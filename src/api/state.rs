// Shared API state

use crate::config::EngineConfig;
use crate::constants;
use crate::dispatch::Dispatcher;
use crate::error::EngineError;
use crate::index::MetadataIndex;
use crate::renewal::{RenewalEngine, SweepScheduler};
use crate::store::CertificateStore;
use crate::vault::PassphraseVault;
use crate::Result;
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

pub struct AppState {
    pub store: Arc<CertificateStore>,
    pub index: Arc<MetadataIndex>,
    pub vault: Arc<PassphraseVault>,
    pub engine: Arc<RenewalEngine>,
    pub dispatcher: Arc<Dispatcher>,
    pub scheduler: Arc<SweepScheduler>,
    pub config: EngineConfig,
    deploy_settings_path: PathBuf,
    deploy_settings_lock: Mutex<()>,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<CertificateStore>,
        index: Arc<MetadataIndex>,
        vault: Arc<PassphraseVault>,
        engine: Arc<RenewalEngine>,
        dispatcher: Arc<Dispatcher>,
        scheduler: Arc<SweepScheduler>,
        config: EngineConfig,
    ) -> Self {
        let deploy_settings_path = config.storage.root.join(constants::DEPLOY_SETTINGS_FILE);
        Self {
            store,
            index,
            vault,
            engine,
            dispatcher,
            scheduler,
            config,
            deploy_settings_path,
            deploy_settings_lock: Mutex::new(()),
        }
    }

    /// Global deployment settings: a JSON object of named categories
    /// (for example reusable SMTP or NPM connection defaults).
    pub async fn load_deploy_settings(&self) -> Result<Map<String, Value>> {
        let _guard = self.deploy_settings_lock.lock().await;
        if !self.deploy_settings_path.exists() {
            return Ok(Map::new());
        }
        let raw = std::fs::read_to_string(&self.deploy_settings_path)?;
        match serde_json::from_str::<Value>(&raw)? {
            Value::Object(map) => Ok(map),
            _ => Err(EngineError::Internal(
                "Deployment settings file is not a JSON object".into(),
            )),
        }
    }

    pub async fn save_deploy_settings(&self, settings: Map<String, Value>) -> Result<()> {
        let _guard = self.deploy_settings_lock.lock().await;
        let json = serde_json::to_string_pretty(&Value::Object(settings))?;
        crate::store::atomic_write(&self.deploy_settings_path, json.as_bytes())?;
        Ok(())
    }
}
