/*!

Transport-neutral wire values.

The secret service speaks a small subset of the D-Bus type system.
[`Value`] models exactly that subset so the client can be driven by
any [`Transport`](crate::transport::Transport), including the fake
daemon used in tests. Each variant maps to one D-Bus signature, so
encoding never has to guess the type of an empty container.

 */

use std::collections::HashMap;
use std::fmt;

use crate::errors::{Error, Result};

/// String key/value tags attached to an item.
pub type Attributes = HashMap<String, String>;

/// An opaque remote object path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectPath(String);

impl ObjectPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for the path the daemon returns when no prompt is needed.
    pub fn is_null_prompt(&self) -> bool {
        self.0 == crate::ss::SS_NULL_PROMPT
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectPath {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// `b`
    Bool(bool),
    /// `s`
    Str(String),
    /// `o`
    Path(ObjectPath),
    /// `ay`
    Bytes(Vec<u8>),
    /// `ao`
    Paths(Vec<ObjectPath>),
    /// `a{ss}`
    Attributes(Attributes),
    /// `a{sv}`; each value is carried inside a variant on the wire
    Properties(HashMap<String, Value>),
    /// `(...)`
    Struct(Vec<Value>),
    /// `v`
    Variant(Box<Value>),
}

impl Value {
    pub fn variant(inner: Value) -> Self {
        Value::Variant(Box::new(inner))
    }

    /// A short name for the shape, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Str(_) => "string",
            Value::Path(_) => "object path",
            Value::Bytes(_) => "byte array",
            Value::Paths(_) => "path array",
            Value::Attributes(_) => "string map",
            Value::Properties(_) => "property map",
            Value::Struct(_) => "struct",
            Value::Variant(_) => "variant",
        }
    }

    /// Strip any number of variant wrappers.
    pub fn unwrap_variant(self) -> Value {
        match self {
            Value::Variant(inner) => inner.unwrap_variant(),
            other => other,
        }
    }

    pub fn into_bool(self) -> Result<bool> {
        match self.unwrap_variant() {
            Value::Bool(b) => Ok(b),
            other => Err(mismatch("bool", &other)),
        }
    }

    pub fn into_string(self) -> Result<String> {
        match self.unwrap_variant() {
            Value::Str(s) => Ok(s),
            other => Err(mismatch("string", &other)),
        }
    }

    pub fn into_path(self) -> Result<ObjectPath> {
        match self.unwrap_variant() {
            Value::Path(p) => Ok(p),
            other => Err(mismatch("object path", &other)),
        }
    }

    pub fn into_bytes(self) -> Result<Vec<u8>> {
        match self.unwrap_variant() {
            Value::Bytes(b) => Ok(b),
            other => Err(mismatch("byte array", &other)),
        }
    }

    /// Accepts an empty string too: a plain-mode daemon may echo one back.
    pub fn into_bytes_or_empty(self) -> Result<Vec<u8>> {
        match self.unwrap_variant() {
            Value::Bytes(b) => Ok(b),
            Value::Str(s) if s.is_empty() => Ok(Vec::new()),
            other => Err(mismatch("byte array", &other)),
        }
    }

    pub fn into_paths(self) -> Result<Vec<ObjectPath>> {
        match self.unwrap_variant() {
            Value::Paths(p) => Ok(p),
            other => Err(mismatch("path array", &other)),
        }
    }

    pub fn into_attributes(self) -> Result<Attributes> {
        match self.unwrap_variant() {
            Value::Attributes(a) => Ok(a),
            // an empty a{sv} carries no type information for its values
            Value::Properties(p) if p.is_empty() => Ok(Attributes::new()),
            other => Err(mismatch("string map", &other)),
        }
    }

    pub fn into_struct(self) -> Result<Vec<Value>> {
        match self.unwrap_variant() {
            Value::Struct(fields) => Ok(fields),
            other => Err(mismatch("struct", &other)),
        }
    }
}

fn mismatch(expected: &str, found: &Value) -> Error {
    Error::BadResponse(format!("expected {expected}, found {}", found.kind()))
}

/// Pop the reply arguments of a call in order, failing on a short reply.
pub(crate) struct Reply {
    method: &'static str,
    args: std::vec::IntoIter<Value>,
}

impl Reply {
    pub(crate) fn new(method: &'static str, args: Vec<Value>) -> Self {
        Self {
            method,
            args: args.into_iter(),
        }
    }

    pub(crate) fn next(&mut self) -> Result<Value> {
        self.args
            .next()
            .ok_or_else(|| Error::BadResponse(format!("{} returned too few values", self.method)))
    }
}
