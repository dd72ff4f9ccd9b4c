/*!

Store configuration.

Defaults match what the store has always used: the `keybase` service
name, the default collection, plain sessions, and a 30 second prompt
timeout. Each may be overridden from the environment.

 */

use std::env;
use std::time::Duration;

use crate::errors::{Error, Result};
use crate::prompt::DEFAULT_PROMPT_TIMEOUT;
use crate::session::AuthenticationMode;
use crate::ss::SS_DEFAULT_COLLECTION;
use crate::value::ObjectPath;

pub const DEFAULT_SERVICE_NAME: &str = "keybase";

const SERVICE_ENV: &str = "SECRET_STORE_SERVICE";
const COLLECTION_ENV: &str = "SECRET_STORE_COLLECTION";
const PROMPT_TIMEOUT_ENV: &str = "SECRET_STORE_PROMPT_TIMEOUT_SECS";
const MODE_ENV: &str = "SECRET_STORE_MODE";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Value of the `service` attribute on every item this store owns.
    pub service_name: String,
    pub collection: ObjectPath,
    pub prompt_timeout: Duration,
    /// Session algorithm used for every operation.
    pub mode: AuthenticationMode,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            collection: ObjectPath::new(SS_DEFAULT_COLLECTION),
            prompt_timeout: DEFAULT_PROMPT_TIMEOUT,
            mode: AuthenticationMode::Plain,
        }
    }
}

impl StoreConfig {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Self::default()
        }
    }

    /// Defaults, with any non-empty environment overrides applied.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();
        if let Some(service) = var(SERVICE_ENV) {
            config.service_name = service;
        }
        if let Some(collection) = var(COLLECTION_ENV) {
            if !collection.starts_with('/') {
                return Err(Error::Config(format!(
                    "{COLLECTION_ENV} must be an object path, got {collection:?}"
                )));
            }
            config.collection = ObjectPath::new(collection);
        }
        if let Some(secs) = var(PROMPT_TIMEOUT_ENV) {
            let secs: u64 = secs
                .trim()
                .parse()
                .map_err(|e| Error::Config(format!("{PROMPT_TIMEOUT_ENV}: {e}")))?;
            config.prompt_timeout = Duration::from_secs(secs);
        }
        if let Some(mode) = var(MODE_ENV) {
            config.mode = mode.trim().parse()?;
        }
        Ok(config)
    }

    pub fn with_mode(mut self, mode: AuthenticationMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_prompt_timeout(mut self, timeout: Duration) -> Self {
        self.prompt_timeout = timeout;
        self
    }
}
