/*!

An in-process fake of the secret service daemon.

It keeps items in memory, negotiates plain and DH sessions, enforces
item locking, and can be told to hand back prompts that complete, are
dismissed, or never answer. Each [`FakeDaemon::connection`] shares the
daemon's state but has its own signal subscriptions, like separate bus
connections would.

 */

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[cfg(feature = "crypto-rust")]
use crate::crypto::{self, AesKey, DhGroup};
use crate::errors::{Error, Result};
use crate::session::Secret;
use crate::ss::*;
use crate::transport::{Signal, SignalHandler, Transport};
use crate::value::{Attributes, ObjectPath, Reply, Value};

const COLLECTION_PREFIX: &str = "/org/freedesktop/secrets/collection/login";

/// What a prompt handed out for some method does once started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptScript {
    Complete,
    Dismiss,
    Silent,
}

struct FakeItem {
    attributes: Attributes,
    label: String,
    secret: Vec<u8>,
}

enum FakeSession {
    Plain,
    #[cfg(feature = "crypto-rust")]
    Dh(AesKey),
}

/// Work a prompt performs when it completes.
enum Deferred {
    Create(ObjectPath),
    Delete(ObjectPath),
    Unlock(Vec<ObjectPath>),
    Lock(Vec<ObjectPath>),
}

struct PendingPrompt {
    script: PromptScript,
    work: Deferred,
}

#[derive(Default)]
struct DaemonState {
    next_id: usize,
    sessions: HashMap<ObjectPath, FakeSession>,
    items: BTreeMap<ObjectPath, FakeItem>,
    // created under a prompt that has not completed yet
    staged: HashMap<ObjectPath, FakeItem>,
    locked: HashSet<ObjectPath>,
    prompt_scripts: HashMap<String, PromptScript>,
    pending: HashMap<ObjectPath, PendingPrompt>,
    scripted_signals: HashMap<ObjectPath, Vec<Signal>>,
    failing: HashSet<String>,
    corrupt_session_output: bool,
    last_sent_secret: Option<Secret>,
    calls: Vec<String>,
}

impl DaemonState {
    fn next_path(&mut self, prefix: &str) -> ObjectPath {
        self.next_id += 1;
        ObjectPath::new(format!("{prefix}/{}", self.next_id))
    }

    fn item(&self, path: &ObjectPath) -> Result<&FakeItem> {
        self.items
            .get(path)
            .ok_or_else(|| Error::Transport(format!("No such object {path}")))
    }

    /// Hand out a prompt for `method` if one is scripted, else run `work` now.
    fn maybe_prompt(&mut self, method: &str, work: Deferred) -> ObjectPath {
        match self.prompt_scripts.get(method).copied() {
            Some(script) => {
                let path = self.next_path("/org/freedesktop/secrets/prompt");
                self.pending
                    .insert(path.clone(), PendingPrompt { script, work });
                path
            }
            None => {
                self.perform(work);
                ObjectPath::new(SS_NULL_PROMPT)
            }
        }
    }

    fn perform(&mut self, work: Deferred) -> Value {
        match work {
            Deferred::Create(path) => {
                if let Some(item) = self.staged.remove(&path) {
                    self.items.insert(path.clone(), item);
                }
                Value::Path(path)
            }
            Deferred::Delete(path) => {
                self.items.remove(&path);
                self.locked.remove(&path);
                Value::Paths(vec![])
            }
            Deferred::Unlock(paths) => {
                for path in &paths {
                    self.locked.remove(path);
                }
                Value::Paths(paths)
            }
            Deferred::Lock(paths) => {
                for path in &paths {
                    if self.items.contains_key(path) {
                        self.locked.insert(path.clone());
                    }
                }
                Value::Paths(paths)
            }
        }
    }

    fn open_session(&mut self, mut args: Reply) -> Result<Vec<Value>> {
        let algorithm = args.next()?.into_string()?;
        let input = args.next()?;
        let path = self.next_path("/org/freedesktop/secrets/session");
        let output = match algorithm.as_str() {
            ALGORITHM_PLAIN => {
                self.sessions.insert(path.clone(), FakeSession::Plain);
                Value::Str(String::new())
            }
            #[cfg(feature = "crypto-rust")]
            ALGORITHM_DH => {
                let group = DhGroup::oakley_group_2();
                let theirs = group.parse_public(&input.into_bytes()?)?;
                let ours = group.new_keypair();
                let key = group.derive_key(&theirs, &ours)?;
                self.sessions.insert(path.clone(), FakeSession::Dh(key));
                if self.corrupt_session_output {
                    Value::Str("not a public key".to_string())
                } else {
                    Value::Bytes(ours.public_bytes())
                }
            }
            other => {
                return Err(Error::Transport(format!(
                    "org.freedesktop.DBus.Error.NotSupported: {other}"
                )));
            }
        };
        Ok(vec![Value::variant(output), Value::Path(path)])
    }

    fn open_secret(&self, secret: &Secret) -> Result<Vec<u8>> {
        match self.sessions.get(&secret.session) {
            Some(FakeSession::Plain) => Ok(secret.value.clone()),
            #[cfg(feature = "crypto-rust")]
            Some(FakeSession::Dh(key)) => crypto::decrypt(&secret.parameters, &secret.value, key),
            None => Err(Error::Transport(format!("No such session {}", secret.session))),
        }
    }

    fn seal_secret(&self, session: &ObjectPath, plaintext: &[u8]) -> Result<Secret> {
        match self.sessions.get(session) {
            Some(FakeSession::Plain) => Ok(Secret::new(session.clone(), Vec::new(), plaintext.to_vec())),
            #[cfg(feature = "crypto-rust")]
            Some(FakeSession::Dh(key)) => {
                let (iv, ciphertext) = crypto::encrypt(plaintext, key);
                Ok(Secret::new(session.clone(), iv, ciphertext))
            }
            None => Err(Error::Transport(format!("No such session {session}"))),
        }
    }

    fn create_item(&mut self, mut args: Reply) -> Result<Vec<Value>> {
        let mut properties = match args.next()? {
            Value::Properties(p) => p,
            other => return Err(Error::Transport(format!("bad properties: {}", other.kind()))),
        };
        let secret = Secret::from_value(args.next()?)?;
        let replace = args.next()?.into_bool()?;
        let attributes = properties
            .remove(SS_ITEM_ATTRIBUTES)
            .map(Value::into_attributes)
            .transpose()?
            .unwrap_or_default();
        let label = properties
            .remove(SS_ITEM_LABEL)
            .map(Value::into_string)
            .transpose()?
            .unwrap_or_default();
        let plaintext = self.open_secret(&secret)?;
        self.last_sent_secret = Some(secret);

        let existing = self
            .items
            .iter()
            .find(|(_, item)| item.attributes == attributes)
            .map(|(path, _)| path.clone());
        let path = match existing {
            Some(path) if replace => path,
            Some(_) => {
                return Err(Error::Transport(
                    "org.freedesktop.Secret.Error.AlreadyExists".to_string(),
                ));
            }
            None => self.next_path(COLLECTION_PREFIX),
        };
        let item = FakeItem {
            attributes,
            label,
            secret: plaintext,
        };
        if self.prompt_scripts.contains_key(SS_CREATE_ITEM) {
            self.staged.insert(path.clone(), item);
            let prompt = self.maybe_prompt(SS_CREATE_ITEM, Deferred::Create(path));
            Ok(vec![Value::Path(SS_NULL_PROMPT.into()), Value::Path(prompt)])
        } else {
            self.items.insert(path.clone(), item);
            Ok(vec![Value::Path(path), Value::Path(SS_NULL_PROMPT.into())])
        }
    }

    fn dispatch(&mut self, path: &ObjectPath, method: &str, args: Vec<Value>) -> Result<Vec<Value>> {
        let mut args = Reply::new("fake", args);
        match method {
            SS_OPEN_SESSION => self.open_session(args),
            SS_SEARCH_ITEMS => {
                let query = args.next()?.into_attributes()?;
                let found = self
                    .items
                    .iter()
                    .filter(|(_, item)| {
                        query
                            .iter()
                            .all(|(k, v)| item.attributes.get(k) == Some(v))
                    })
                    .map(|(path, _)| path.clone())
                    .collect();
                Ok(vec![Value::Paths(found)])
            }
            SS_CREATE_ITEM => self.create_item(args),
            SS_DELETE => {
                self.item(path)?;
                let prompt = self.maybe_prompt(SS_DELETE, Deferred::Delete(path.clone()));
                Ok(vec![Value::Path(prompt)])
            }
            SS_GET_SECRET => {
                let session = args.next()?.into_path()?;
                if self.locked.contains(path) {
                    return Err(Error::Transport(format!(
                        "org.freedesktop.Secret.Error.IsLocked: {path}"
                    )));
                }
                let plaintext = self.item(path)?.secret.clone();
                Ok(vec![self.seal_secret(&session, &plaintext)?.to_value()])
            }
            SS_UNLOCK | SS_LOCK => {
                let objects = args.next()?.into_paths()?;
                let work = if method == SS_UNLOCK {
                    Deferred::Unlock(objects.clone())
                } else {
                    Deferred::Lock(objects.clone())
                };
                let prompt = self.maybe_prompt(method, work);
                let done = if prompt.is_null_prompt() { objects } else { vec![] };
                Ok(vec![Value::Paths(done), Value::Path(prompt)])
            }
            "Get" => {
                let _interface = args.next()?.into_string()?;
                let name = args.next()?.into_string()?;
                if name != SS_ATTRIBUTES_PROPERTY {
                    return Err(Error::Transport(format!("No such property {name}")));
                }
                let attributes = self.item(path)?.attributes.clone();
                Ok(vec![Value::variant(Value::Attributes(attributes))])
            }
            other => Err(Error::Transport(format!("Unknown method {other}"))),
        }
    }

    /// Signals the prompt at `path` emits when started.
    fn start_prompt(&mut self, path: &ObjectPath) -> Result<Vec<Signal>> {
        if let Some(signals) = self.scripted_signals.remove(path) {
            return Ok(signals);
        }
        let pending = self
            .pending
            .remove(path)
            .ok_or_else(|| Error::Transport(format!("No such prompt {path}")))?;
        let body = match pending.script {
            PromptScript::Silent => return Ok(vec![]),
            PromptScript::Dismiss => vec![Value::Bool(true), Value::variant(Value::Paths(vec![]))],
            PromptScript::Complete => {
                let result = self.perform(pending.work);
                vec![Value::Bool(false), Value::variant(result)]
            }
        };
        Ok(vec![Signal {
            path: path.clone(),
            interface: SS_INTERFACE_PROMPT.to_string(),
            member: SS_PROMPT_COMPLETED.to_string(),
            body,
        }])
    }
}

#[derive(Clone)]
pub struct FakeDaemon {
    state: Arc<Mutex<DaemonState>>,
    handlers: Arc<Mutex<Vec<SignalHandler>>>,
}

impl FakeDaemon {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(DaemonState::default())),
            handlers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A new connection to the same daemon, with no subscriptions.
    pub fn connection(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            handlers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn state(&self) -> MutexGuard<'_, DaemonState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe_router(&self, router: &Arc<crate::prompt::PromptRouter>) {
        self.subscribe(SS_INTERFACE_PROMPT, SS_PROMPT_COMPLETED, router.handler())
            .unwrap();
    }

    /// Every later call of `method` hands back a prompt following `script`.
    pub fn set_prompt(&self, method: &str, script: PromptScript) {
        self.state()
            .prompt_scripts
            .insert(method.to_string(), script);
    }

    /// Emit exactly `signals` when the prompt at `path` is started.
    pub fn on_prompt(&self, path: &str, signals: Vec<Signal>) {
        self.state()
            .scripted_signals
            .insert(ObjectPath::new(path), signals);
    }

    pub fn fail_method(&self, method: &str) {
        self.state().failing.insert(method.to_string());
    }

    pub fn corrupt_session_output(&self) {
        self.state().corrupt_session_output = true;
    }

    pub fn insert_item(&self, attributes: Attributes, secret: &[u8], locked: bool) -> ObjectPath {
        let mut state = self.state();
        let path = state.next_path(COLLECTION_PREFIX);
        state.items.insert(
            path.clone(),
            FakeItem {
                attributes,
                label: String::new(),
                secret: secret.to_vec(),
            },
        );
        if locked {
            state.locked.insert(path.clone());
        }
        path
    }

    pub fn item_count(&self) -> usize {
        self.state().items.len()
    }

    pub fn label(&self, item: &ObjectPath) -> Option<String> {
        self.state().items.get(item).map(|i| i.label.clone())
    }

    pub fn is_locked(&self, item: &ObjectPath) -> bool {
        self.state().locked.contains(item)
    }

    pub fn last_sent_secret(&self) -> Option<Secret> {
        self.state().last_sent_secret.clone()
    }

    /// `"{path} {method}"` for every call, in order.
    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn count_calls(&self, method: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.ends_with(&format!(" {method}")))
            .count()
    }
}

impl Transport for FakeDaemon {
    fn call(
        &self,
        path: &ObjectPath,
        _interface: &str,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Vec<Value>> {
        let signals = {
            let mut state = self.state();
            state.calls.push(format!("{path} {method}"));
            if state.failing.contains(method) {
                return Err(Error::Transport(format!(
                    "org.freedesktop.DBus.Error.ServiceUnknown: {method}"
                )));
            }
            if method == SS_PROMPT {
                state.start_prompt(path)?
            } else {
                return state.dispatch(path, method, args);
            }
        };
        // deliver outside the state lock, as a bus would
        let handlers = self.handlers.lock().unwrap_or_else(PoisonError::into_inner);
        for signal in signals {
            for handler in handlers.iter() {
                handler(signal.clone());
            }
        }
        Ok(vec![])
    }

    fn get_property(&self, path: &ObjectPath, interface: &str, name: &str) -> Result<Value> {
        let reply = self.call(
            path,
            DBUS_INTERFACE_PROPERTIES,
            "Get",
            vec![Value::Str(interface.to_string()), Value::Str(name.to_string())],
        )?;
        reply
            .into_iter()
            .next()
            .map(Value::unwrap_variant)
            .ok_or_else(|| Error::BadResponse("no property value".to_string()))
    }

    fn subscribe(&self, _interface: &str, _member: &str, handler: SignalHandler) -> Result<()> {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handler);
        Ok(())
    }
}
