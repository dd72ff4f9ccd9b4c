/*!

The remote-procedure-call contract the client is written against.

The client never talks to a bus directly. It invokes methods on named
remote objects, reads properties, and receives asynchronous signals,
all through a [`Transport`]. The production implementation lives in
[`bus`](crate::bus); tests use an in-process fake daemon.

 */

use std::time::Duration;

use crate::errors::Result;
use crate::value::{ObjectPath, Value};

/// An asynchronous notification emitted by a remote object.
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    /// The object that emitted the signal.
    pub path: ObjectPath,
    pub interface: String,
    pub member: String,
    pub body: Vec<Value>,
}

/// Receives every signal that matches a subscription.
pub type SignalHandler = Box<dyn Fn(Signal) + Send + Sync + 'static>;

pub trait Transport: Send + Sync {
    /// Invoke `interface.method` on the object at `path` and return the reply arguments.
    fn call(
        &self,
        path: &ObjectPath,
        interface: &str,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Vec<Value>>;

    /// Read one property of the object at `path`, with any variant wrapper removed.
    fn get_property(&self, path: &ObjectPath, interface: &str, name: &str) -> Result<Value>;

    /// Deliver every `interface.member` signal to `handler`, from any object.
    fn subscribe(&self, interface: &str, member: &str, handler: SignalHandler) -> Result<()>;

    /// Give the transport a chance to read and dispatch incoming signals,
    /// blocking for at most `timeout`.
    ///
    /// Transports that dispatch from their own thread keep the default,
    /// which just waits.
    fn pump(&self, timeout: Duration) -> Result<()> {
        std::thread::sleep(timeout);
        Ok(())
    }
}
