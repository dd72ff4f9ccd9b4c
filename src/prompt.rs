/*!

Driving secret service prompts to completion.

Operations that may need user consent hand back a prompt path. Unless
that path is the null prompt `/`, the client calls `Prompt` on it and
waits for the prompt object to emit `Completed`.

Each in-flight prompt is a [`PromptWaiter`] with its own mailbox. The
[`PromptRouter`] receives every `Completed` signal the transport sees
and delivers it to the waiter registered for the emitting object path,
so any number of prompts can be outstanding on one client. Signals for
paths nobody waits on are dropped.

 */

use std::collections::HashMap;
use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::{trace, warn};

use crate::errors::{Error, Result};
use crate::ss::{PROMPT_WINDOW_ID, SS_INTERFACE_PROMPT, SS_PROMPT, SS_PROMPT_COMPLETED};
use crate::transport::{Signal, SignalHandler, Transport};
use crate::value::{ObjectPath, Reply, Value};

pub const DEFAULT_PROMPT_TIMEOUT: Duration = Duration::from_secs(30);

// Upper bound on a single blocking read of the transport.
const PUMP_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Default)]
pub struct PromptRouter {
    waiters: Mutex<HashMap<ObjectPath, Sender<Signal>>>,
}

impl PromptRouter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A handler to subscribe to `Prompt.Completed` with.
    pub fn handler(self: &Arc<Self>) -> SignalHandler {
        let router = Arc::clone(self);
        Box::new(move |signal| router.dispatch(signal))
    }

    fn dispatch(&self, signal: Signal) {
        if signal.interface != SS_INTERFACE_PROMPT || signal.member != SS_PROMPT_COMPLETED {
            trace!("ignoring signal {}.{}", signal.interface, signal.member);
            return;
        }
        let waiters = self.waiters.lock().unwrap_or_else(PoisonError::into_inner);
        match waiters.get(&signal.path) {
            // a send error means the waiter already gave up
            Some(mailbox) => {
                let _ = mailbox.send(signal);
            }
            None => trace!("no waiter for prompt {}", signal.path),
        }
    }

    fn register(self: &Arc<Self>, path: ObjectPath) -> Registration {
        let (tx, rx) = channel();
        self.waiters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.clone(), tx);
        Registration {
            router: Arc::clone(self),
            path,
            mailbox: rx,
        }
    }

    pub fn in_flight(&self) -> usize {
        self.waiters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// A waiter's slot in the router; removed again on drop.
struct Registration {
    router: Arc<PromptRouter>,
    path: ObjectPath,
    mailbox: Receiver<Signal>,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.router
            .waiters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.path);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PromptState {
    Issued,
    Awaiting { deadline: Instant },
    Completed(Value),
    Dismissed,
    TimedOut,
}

impl PromptState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PromptState::Completed(_) | PromptState::Dismissed | PromptState::TimedOut
        )
    }
}

/// One in-flight prompt.
pub struct PromptWaiter<'a> {
    transport: &'a dyn Transport,
    registration: Registration,
    timeout: Duration,
    state: PromptState,
}

impl<'a> PromptWaiter<'a> {
    /// Register for the prompt's completion. Nothing is sent until the first [`step`](Self::step).
    pub fn new(
        transport: &'a dyn Transport,
        router: &Arc<PromptRouter>,
        prompt: ObjectPath,
        timeout: Duration,
    ) -> Self {
        Self {
            transport,
            registration: router.register(prompt),
            timeout,
            state: PromptState::Issued,
        }
    }

    pub fn state(&self) -> &PromptState {
        &self.state
    }

    /// Advance the state machine by one transition at most.
    pub fn step(&mut self) -> Result<()> {
        let next = match &self.state {
            PromptState::Issued => {
                self.transport.call(
                    &self.registration.path,
                    SS_INTERFACE_PROMPT,
                    SS_PROMPT,
                    vec![Value::Str(PROMPT_WINDOW_ID.to_string())],
                )?;
                PromptState::Awaiting {
                    deadline: Instant::now() + self.timeout,
                }
            }
            PromptState::Awaiting { deadline } => {
                let deadline = *deadline;
                match self.registration.mailbox.try_recv() {
                    Ok(signal) => completion(signal)?,
                    Err(_) => {
                        let now = Instant::now();
                        if now >= deadline {
                            PromptState::TimedOut
                        } else {
                            self.transport.pump(PUMP_INTERVAL.min(deadline - now))?;
                            return Ok(());
                        }
                    }
                }
            }
            _ => return Ok(()),
        };
        self.state = next;
        Ok(())
    }

    /// Step until the prompt completes, is dismissed, or times out.
    pub fn wait(mut self) -> Result<Value> {
        while !self.state.is_terminal() {
            self.step()?;
        }
        let path = self.registration.path.clone();
        match std::mem::replace(&mut self.state, PromptState::Issued) {
            PromptState::Completed(result) => Ok(result),
            PromptState::Dismissed => {
                warn!("prompt {path} was dismissed");
                Err(Error::PromptDismissed)
            }
            _ => {
                warn!("prompt {path} timed out after {:?}", self.timeout);
                Err(Error::PromptTimedOut(self.timeout))
            }
        }
    }
}

fn completion(signal: Signal) -> Result<PromptState> {
    let mut body = Reply::new("Prompt.Completed", signal.body);
    let dismissed = body.next()?.into_bool()?;
    if dismissed {
        return Ok(PromptState::Dismissed);
    }
    Ok(PromptState::Completed(body.next()?.unwrap_variant()))
}

/// Resolve `prompt`, returning the prompt's result value if one was needed.
///
/// The null prompt returns at once without registering or calling anything.
pub fn prompt_and_wait(
    transport: &dyn Transport,
    router: &Arc<PromptRouter>,
    prompt: &ObjectPath,
    timeout: Duration,
) -> Result<Option<Value>> {
    if prompt.is_null_prompt() {
        return Ok(None);
    }
    PromptWaiter::new(transport, router, prompt.clone(), timeout)
        .wait()
        .map(Some)
}
