/*!

Per-user secret store on top of the secret service.

Each user's secret is one item in the configured collection, tagged
with `service` (the configured service name) and `username`, and
labeled `{username}@{service}`.

Every operation connects, opens a session, does its work and drops
both again; nothing is pooled between calls, so no key material
outlives the call that needed it.

If more than one item matches a user, retrieval refuses to pick one
and fails with [`Error::Ambiguous`]; clearing deletes all of them.

 */

use std::time::Instant;

use tracing::debug;

use crate::config::StoreConfig;
use crate::cred::FullSecret;
use crate::errors::{Error, Result};
use crate::service::{SecretService, new_secret_properties};
use crate::value::{Attributes, ObjectPath};

type Connector = Box<dyn Fn() -> Result<SecretService> + Send + Sync>;

pub struct Store {
    config: StoreConfig,
    connector: Connector,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Store {
    /// A store that talks to the secret service on the session bus.
    pub fn new(config: StoreConfig) -> Self {
        Self::with_connector(config, SecretService::connect)
    }

    /// A store that gets a fresh client from `connector` for each operation.
    pub fn with_connector<F>(config: StoreConfig, connector: F) -> Self
    where
        F: Fn() -> Result<SecretService> + Send + Sync + 'static,
    {
        Self {
            config,
            connector: Box::new(connector),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn connect(&self) -> Result<SecretService> {
        Ok((self.connector)()?.with_prompt_timeout(self.config.prompt_timeout))
    }

    fn service_attributes(&self) -> Attributes {
        Attributes::from([("service".to_string(), self.config.service_name.clone())])
    }

    fn user_attributes(&self, username: &str) -> Attributes {
        let mut attributes = self.service_attributes();
        attributes.insert("username".to_string(), username.to_string());
        attributes
    }

    fn find_items(&self, ss: &SecretService, username: &str) -> Result<Vec<ObjectPath>> {
        ss.search_collection(&self.config.collection, &self.user_attributes(username))
    }

    pub fn retrieve_secret(&self, username: &str) -> Result<FullSecret> {
        traced("retrieve_secret", || {
            let ss = self.connect()?;
            let session = ss.open_session(self.config.mode)?;
            let item = match self.find_items(&ss, username)?.as_slice() {
                [] => return Err(Error::NoEntry),
                [item] => item.clone(),
                many => return Err(Error::Ambiguous(many.len())),
            };
            ss.unlock(std::slice::from_ref(&item))?;
            let bytes = ss.get_secret(&item, &session)?;
            FullSecret::from_bytes(&bytes)
        })
    }

    /// Store `secret` for `username`, replacing any secret already stored.
    pub fn store_secret(&self, username: &str, secret: &FullSecret) -> Result<()> {
        traced("store_secret", || {
            let ss = self.connect()?;
            let session = ss.open_session(self.config.mode)?;
            let label = format!("{username}@{}", self.config.service_name);
            let properties = new_secret_properties(&label, &self.user_attributes(username));
            let secret = session.new_secret(secret.as_bytes())?;
            ss.unlock(std::slice::from_ref(&self.config.collection))?;
            ss.create_item(&self.config.collection, properties, &secret, true)?;
            Ok(())
        })
    }

    /// Delete `username`'s secret. Succeeds if there is none.
    pub fn clear_secret(&self, username: &str) -> Result<()> {
        traced("clear_secret", || {
            let ss = self.connect()?;
            let items = self.find_items(&ss, username)?;
            if items.is_empty() {
                debug!("secret not found; short-circuiting clear");
                return Ok(());
            }
            ss.unlock(&items)?;
            for item in &items {
                ss.delete_item(item)?;
            }
            Ok(())
        })
    }

    /// The username of every item stored under the configured service.
    pub fn get_users_with_stored_secrets(&self) -> Result<Vec<String>> {
        traced("get_users_with_stored_secrets", || {
            let ss = self.connect()?;
            let items = ss.search_collection(&self.config.collection, &self.service_attributes())?;
            items
                .iter()
                .map(|item| {
                    ss.get_attributes(item)?
                        .remove("username")
                        .ok_or_else(|| {
                            Error::BadResponse(format!("secret {item} does not have a username"))
                        })
                })
                .collect()
        })
    }
}

fn traced<T>(op: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
    let started = Instant::now();
    debug!("{op}: start");
    let result = f();
    match &result {
        Ok(_) => debug!("{op}: ok [time={:?}]", started.elapsed()),
        Err(err) => debug!("{op}: failed: {err} [time={:?}]", started.elapsed()),
    }
    result
}
