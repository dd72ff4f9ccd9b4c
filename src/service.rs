/*!

Secret service protocol client.

A [`SecretService`] owns one transport connection to the daemon. It
negotiates sessions, issues the remote-object calls of the protocol,
and drives any prompt those calls hand back before reporting success.

Calls that never prompt (search, attributes, get-secret) may be issued
from several threads at once. Prompting calls may be too: each prompt
is correlated with its own completion signal by object path.

*/

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;
use zeroize::Zeroizing;

use crate::bus::Bus;
#[cfg(feature = "crypto-rust")]
use crate::crypto::DhGroup;
use crate::errors::Result;
use crate::prompt::{DEFAULT_PROMPT_TIMEOUT, PromptRouter, prompt_and_wait};
use crate::session::{AuthenticationMode, Secret, Session};
use crate::ss::{
    SS_ATTRIBUTES_PROPERTY, SS_CREATE_ITEM, SS_DBUS_PATH, SS_DELETE, SS_GET_SECRET,
    SS_INTERFACE_COLLECTION, SS_INTERFACE_ITEM, SS_INTERFACE_PROMPT, SS_INTERFACE_SERVICE,
    SS_ITEM_ATTRIBUTES, SS_ITEM_LABEL, SS_LOCK, SS_OPEN_SESSION, SS_PROMPT_COMPLETED,
    SS_SEARCH_ITEMS, SS_UNLOCK,
};
use crate::transport::Transport;
use crate::value::{Attributes, ObjectPath, Reply, Value};

pub struct SecretService {
    transport: Box<dyn Transport>,
    router: Arc<PromptRouter>,
    prompt_timeout: Duration,
}

impl SecretService {
    /// Connect to the secret service on the session bus.
    pub fn connect() -> Result<Self> {
        Self::with_transport(Bus::connect()?)
    }

    /// Run the protocol over an existing transport.
    pub fn with_transport<T: Transport + 'static>(transport: T) -> Result<Self> {
        let router = PromptRouter::new();
        transport.subscribe(SS_INTERFACE_PROMPT, SS_PROMPT_COMPLETED, router.handler())?;
        Ok(Self {
            transport: Box::new(transport),
            router,
            prompt_timeout: DEFAULT_PROMPT_TIMEOUT,
        })
    }

    /// How long to wait for a prompt to complete; 30 seconds unless changed.
    pub fn with_prompt_timeout(mut self, timeout: Duration) -> Self {
        self.prompt_timeout = timeout;
        self
    }

    fn service_path() -> ObjectPath {
        ObjectPath::new(SS_DBUS_PATH)
    }

    fn call(
        &self,
        path: &ObjectPath,
        interface: &str,
        method: &'static str,
        args: Vec<Value>,
    ) -> Result<Reply> {
        let values = self.transport.call(path, interface, method, args)?;
        Ok(Reply::new(method, values))
    }

    pub fn open_session(&self, mode: AuthenticationMode) -> Result<Session> {
        let session = match mode {
            AuthenticationMode::Plain => {
                let mut reply = self.call(
                    &Self::service_path(),
                    SS_INTERFACE_SERVICE,
                    SS_OPEN_SESSION,
                    vec![
                        Value::Str(mode.algorithm().to_string()),
                        Value::variant(Value::Str(String::new())),
                    ],
                )?;
                let _output = reply.next()?;
                Session::plain(reply.next()?.into_path()?)
            }
            #[cfg(feature = "crypto-rust")]
            AuthenticationMode::DhIetf1024Sha256Aes128CbcPkcs7 => {
                let group = DhGroup::oakley_group_2();
                let keypair = group.new_keypair();
                let mut reply = self.call(
                    &Self::service_path(),
                    SS_INTERFACE_SERVICE,
                    SS_OPEN_SESSION,
                    vec![
                        Value::Str(mode.algorithm().to_string()),
                        Value::variant(Value::Bytes(keypair.public_bytes())),
                    ],
                )?;
                let their_public = group.parse_public(&reply.next()?.into_bytes()?)?;
                let path = reply.next()?.into_path()?;
                let key = group.derive_key(&their_public, &keypair)?;
                Session::encrypted(path, key)
            }
            #[cfg(not(feature = "crypto-rust"))]
            other => return Err(crate::errors::Error::UnsupportedMode(other.to_string())),
        };
        debug!("opened {} session {}", session.mode(), session.path());
        Ok(session)
    }

    /// Items in `collection` whose attributes include every pair in `attributes`.
    pub fn search_collection(
        &self,
        collection: &ObjectPath,
        attributes: &Attributes,
    ) -> Result<Vec<ObjectPath>> {
        self.call(
            collection,
            SS_INTERFACE_COLLECTION,
            SS_SEARCH_ITEMS,
            vec![Value::Attributes(attributes.clone())],
        )?
        .next()?
        .into_paths()
    }

    /// Create an item, waiting out any prompt the daemon requires.
    ///
    /// With `replace`, an existing item with the same attributes is overwritten.
    pub fn create_item(
        &self,
        collection: &ObjectPath,
        properties: HashMap<String, Value>,
        secret: &Secret,
        replace: bool,
    ) -> Result<ObjectPath> {
        let mut reply = self.call(
            collection,
            SS_INTERFACE_COLLECTION,
            SS_CREATE_ITEM,
            vec![
                Value::Properties(properties),
                secret.to_value(),
                Value::Bool(replace),
            ],
        )?;
        let item = reply.next()?.into_path()?;
        let prompt = reply.next()?.into_path()?;
        // a prompted create only learns its item path from the prompt result
        match self.prompt_and_wait(&prompt)? {
            Some(result) if item.is_null_prompt() => result.into_path(),
            _ => Ok(item),
        }
    }

    pub fn delete_item(&self, item: &ObjectPath) -> Result<()> {
        let prompt = self
            .call(item, SS_INTERFACE_ITEM, SS_DELETE, vec![])?
            .next()?
            .into_path()?;
        self.prompt_and_wait(&prompt)?;
        Ok(())
    }

    pub fn get_attributes(&self, item: &ObjectPath) -> Result<Attributes> {
        self.transport
            .get_property(item, SS_INTERFACE_ITEM, SS_ATTRIBUTES_PROPERTY)?
            .into_attributes()
    }

    /// Fetch an item's secret and open it with `session`'s key.
    pub fn get_secret(&self, item: &ObjectPath, session: &Session) -> Result<Zeroizing<Vec<u8>>> {
        let value = self
            .call(
                item,
                SS_INTERFACE_ITEM,
                SS_GET_SECRET,
                vec![Value::Path(session.path().clone())],
            )?
            .next()?;
        let secret = Secret::from_value(value)?;
        session.open_secret(&secret)
    }

    /// Unlock items or collections, prompting the user if the daemon asks to.
    pub fn unlock(&self, objects: &[ObjectPath]) -> Result<()> {
        self.set_locked(SS_UNLOCK, objects)
    }

    pub fn lock_items(&self, items: &[ObjectPath]) -> Result<()> {
        self.set_locked(SS_LOCK, items)
    }

    fn set_locked(&self, method: &'static str, objects: &[ObjectPath]) -> Result<()> {
        let mut reply = self.call(
            &Self::service_path(),
            SS_INTERFACE_SERVICE,
            method,
            vec![Value::Paths(objects.to_vec())],
        )?;
        let done = reply.next()?.into_paths()?;
        let prompt = reply.next()?.into_path()?;
        debug!("{method}: {} of {} done without prompting", done.len(), objects.len());
        if let Some(result) = self.prompt_and_wait(&prompt)? {
            debug!("{method}: prompt finished with {}", result.kind());
        }
        Ok(())
    }

    /// Resolve a prompt path returned by another call.
    ///
    /// Returns `None` at once for the null prompt. Otherwise the prompt is
    /// started and its result returned; dismissal and timeout are errors.
    pub fn prompt_and_wait(&self, prompt: &ObjectPath) -> Result<Option<Value>> {
        prompt_and_wait(
            self.transport.as_ref(),
            &self.router,
            prompt,
            self.prompt_timeout,
        )
    }
}

/// The property map `CreateItem` expects: a label and the item's attributes.
pub fn new_secret_properties(label: &str, attributes: &Attributes) -> HashMap<String, Value> {
    HashMap::from([
        (SS_ITEM_LABEL.to_string(), Value::Str(label.to_string())),
        (
            SS_ITEM_ATTRIBUTES.to_string(),
            Value::Attributes(attributes.clone()),
        ),
    ])
}
