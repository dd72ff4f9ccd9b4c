/*!

Session-bus transport.

This is the production [`Transport`]: a thread-safe blocking connection
to the D-Bus session bus, addressing every call to the secret service
daemon. Signals are only read from the socket while some caller is
inside [`Transport::pump`], which is what the prompt waiter does while
it blocks.

 */

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use dbus::arg::{ArgType, IterAppend, PropMap, RefArg, Variant};
use dbus::blocking::{BlockingSender, SyncConnection};
use dbus::message::MatchRule;
use dbus::strings::{BusName, Interface, Member};
use dbus::{Message, Path};
use tracing::trace;

use crate::errors::{Error, Result, decode_error, platform_failure};
use crate::ss::{DBUS_INTERFACE_PROPERTIES, SS_DBUS_DEST};
use crate::transport::{Signal, SignalHandler, Transport};
use crate::value::{Attributes, ObjectPath, Value};

const CALL_TIMEOUT: Duration = Duration::from_secs(25);

pub struct Bus {
    conn: SyncConnection,
    timeout: Duration,
}

impl Bus {
    /// Open a fresh connection to the session bus.
    pub fn connect() -> Result<Self> {
        let conn = SyncConnection::new_session().map_err(platform_failure)?;
        Ok(Self {
            conn,
            timeout: CALL_TIMEOUT,
        })
    }

    /// Override how long a single method call may block.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Transport for Bus {
    fn call(
        &self,
        path: &ObjectPath,
        interface: &str,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Vec<Value>> {
        let mut msg = Message::new_method_call(
            BusName::new(SS_DBUS_DEST).map_err(platform_failure)?,
            to_dbus_path(path)?,
            Interface::new(interface).map_err(platform_failure)?,
            Member::new(method).map_err(platform_failure)?,
        )
        .map_err(platform_failure)?;
        {
            let mut ia = IterAppend::new(&mut msg);
            for arg in &args {
                let arg = to_refarg(arg)?;
                RefArg::append(&*arg, &mut ia);
            }
        }
        let reply = self
            .conn
            .send_with_reply_and_block(msg, self.timeout)
            .map_err(platform_failure)?;
        read_body(&reply)
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
            .ok_or_else(|| Error::BadResponse(format!("no value for property {name}")))
    }

    fn subscribe(&self, interface: &str, member: &str, handler: SignalHandler) -> Result<()> {
        let rule = MatchRule::new_signal(
            Interface::new(interface).map_err(platform_failure)?,
            Member::new(member).map_err(platform_failure)?,
        )
        .static_clone();
        self.conn
            .add_match(rule, move |_: (), _: &SyncConnection, msg: &Message| {
                match signal_from_message(msg) {
                    Ok(signal) => handler(signal),
                    Err(err) => trace!("dropping undecodable signal: {err}"),
                }
                true
            })
            .map_err(platform_failure)?;
        Ok(())
    }

    fn pump(&self, timeout: Duration) -> Result<()> {
        self.conn.process(timeout).map_err(platform_failure)?;
        Ok(())
    }
}

fn to_dbus_path(path: &ObjectPath) -> Result<Path<'static>> {
    Path::new(path.as_str().to_string()).map_err(decode_error)
}

fn to_refarg(value: &Value) -> Result<Box<dyn RefArg>> {
    let arg: Box<dyn RefArg> = match value {
        Value::Bool(b) => Box::new(*b),
        Value::Str(s) => Box::new(s.clone()),
        Value::Path(p) => Box::new(to_dbus_path(p)?),
        Value::Bytes(b) => Box::new(b.clone()),
        Value::Paths(paths) => Box::new(
            paths
                .iter()
                .map(to_dbus_path)
                .collect::<Result<Vec<_>>>()?,
        ),
        Value::Attributes(attrs) => Box::new(attrs.clone()),
        Value::Properties(props) => {
            let mut map = PropMap::new();
            for (key, value) in props {
                map.insert(key.clone(), Variant(to_refarg(value)?));
            }
            Box::new(map)
        }
        Value::Struct(fields) => Box::new(
            fields
                .iter()
                .map(to_refarg)
                .collect::<Result<VecDeque<_>>>()?,
        ),
        Value::Variant(inner) => Box::new(Variant(to_refarg(inner)?)),
    };
    Ok(arg)
}

fn from_refarg(arg: &dyn RefArg) -> Result<Value> {
    match arg.arg_type() {
        ArgType::Boolean => arg
            .as_u64()
            .or_else(|| arg.as_i64().map(|n| n as u64))
            .map(|n| Value::Bool(n != 0))
            .ok_or_else(|| decode_error("unreadable boolean")),
        ArgType::String => Ok(Value::Str(read_str(arg)?)),
        ArgType::ObjectPath => Ok(Value::Path(ObjectPath::new(read_str(arg)?))),
        ArgType::Variant => {
            let inner = items(arg)?
                .next()
                .ok_or_else(|| decode_error("empty variant"))?;
            Ok(Value::variant(from_refarg(inner)?))
        }
        ArgType::Struct => Ok(Value::Struct(
            items(arg)?.map(from_refarg).collect::<Result<_>>()?,
        )),
        ArgType::Array => from_array(arg),
        other => Err(decode_error(format!("unsupported argument type {other:?}"))),
    }
}

fn from_array(arg: &dyn RefArg) -> Result<Value> {
    let signature = arg.signature();
    match &*signature {
        "ay" => items(arg)?
            .map(|b| {
                b.as_u64()
                    .and_then(|b| u8::try_from(b).ok())
                    .ok_or_else(|| decode_error("unreadable byte"))
            })
            .collect::<Result<Vec<u8>>>()
            .map(Value::Bytes),
        "ao" => items(arg)?
            .map(|p| read_str(p).map(ObjectPath::new))
            .collect::<Result<Vec<_>>>()
            .map(Value::Paths),
        "a{ss}" => {
            let mut attrs = Attributes::new();
            let mut entries = items(arg)?;
            while let (Some(k), Some(v)) = (entries.next(), entries.next()) {
                attrs.insert(read_str(k)?, read_str(v)?);
            }
            Ok(Value::Attributes(attrs))
        }
        "a{sv}" => {
            let mut props = HashMap::new();
            let mut entries = items(arg)?;
            while let (Some(k), Some(v)) = (entries.next(), entries.next()) {
                props.insert(read_str(k)?, from_refarg(v)?.unwrap_variant());
            }
            Ok(Value::Properties(props))
        }
        other => Err(decode_error(format!("unsupported array signature {other}"))),
    }
}

fn items<'a>(arg: &'a dyn RefArg) -> Result<Box<dyn Iterator<Item = &'a dyn RefArg> + 'a>> {
    arg.as_iter()
        .ok_or_else(|| decode_error("container argument is not iterable"))
}

fn read_str(arg: &dyn RefArg) -> Result<String> {
    arg.as_str()
        .map(str::to_string)
        .ok_or_else(|| decode_error("expected a string"))
}

fn read_body(msg: &Message) -> Result<Vec<Value>> {
    let mut iter = msg.iter_init();
    let mut values = Vec::new();
    while let Some(arg) = iter.get_refarg() {
        values.push(from_refarg(&*arg)?);
        iter.next();
    }
    Ok(values)
}

fn signal_from_message(msg: &Message) -> Result<Signal> {
    let path = msg.path().ok_or_else(|| decode_error("signal without path"))?;
    let interface = msg
        .interface()
        .ok_or_else(|| decode_error("signal without interface"))?;
    let member = msg
        .member()
        .ok_or_else(|| decode_error("signal without member"))?;
    Ok(Signal {
        path: ObjectPath::new(&*path),
        interface: interface.to_string(),
        member: member.to_string(),
        body: read_body(msg)?,
    })
}
