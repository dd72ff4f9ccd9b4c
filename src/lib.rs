/*!

# Secret Service client and per-user secret store

This crate talks to the freedesktop.org
[Secret Service](https://specifications.freedesktop.org/secret-service/)
(GNOME Keyring, KWallet, KeePassXC, ...) over the D-Bus session bus.
It has two layers.

## Protocol client

[`SecretService`] owns one connection to the daemon. It opens
sessions, either `plain` or `dh-ietf1024-sha256-aes128-cbc-pkcs7`. In
the second mode the secret is AES-encrypted on the bus under a key
negotiated by Diffie-Hellman over the RFC 2409 Second Oakley Group. On
that session it searches collections, creates and deletes items, reads
attributes and secrets, and locks or unlocks objects.

Operations that may need user consent (create, delete, lock, unlock)
get a prompt back from the daemon. The client starts the prompt and
waits for the prompt object's `Completed` signal for up to 30 seconds
by default. A dismissed prompt is [`Error::PromptDismissed`]. A prompt
nobody answers is [`Error::PromptTimedOut`]. Completion signals are
matched to prompts by the emitting object path, so several prompts can
be in flight on one client.

The bus itself sits behind the [`Transport`](transport::Transport)
trait. [`bus::Bus`] is the session-bus implementation.

## Store

[`Store`] maps a `(service, username)` pair to exactly one item in a
collection (the default collection unless configured otherwise). It
provides:

- `store_secret` creates the item with `replace` set, so storing again
  overwrites.
- `retrieve_secret` fails with [`Error::NoEntry`] if nothing matches and
  with [`Error::Ambiguous`] if several items do.
- `clear_secret` succeeds when there is nothing to clear.
- `get_users_with_stored_secrets` lists the users of the configured
  service.

Items are tagged with these attributes:

- `service` (from [`StoreConfig::service_name`])
- `username`

New items are labeled `{username}@{service}`.

Each store operation opens its own connection and session and drops
them on return.

## Headless usage

If you must use the secret-service on a headless linux box,
be aware that there are known issues with getting
dbus and secret-service and the gnome keyring
to work properly in headless environments.
For a quick workaround, start the keyring unlocked with a known password:

```shell
function unlock-keyring ()
{
    read -rsp "Password: " pass
    echo -n "$pass" | gnome-keyring-daemon --unlock
    unset pass
}
```

For an excellent treatment of all the headless dbus issues, see
[this answer on ServerFault](https://serverfault.com/a/906224/79617).

## Usage on Windows Subsystem for Linux

There is no default collection under WSL. Set
[`StoreConfig::collection`] to an existing collection's path there.

 */

pub mod bus;
pub mod config;
pub mod cred;
#[cfg(feature = "crypto-rust")]
pub mod crypto;
pub mod errors;
pub mod prompt;
pub mod service;
pub mod session;
pub mod ss;
pub mod store;
pub mod transport;
pub mod value;

pub use config::StoreConfig;
pub use cred::FullSecret;
pub use errors::{Error, Result};
pub use service::SecretService;
pub use session::AuthenticationMode;
pub use store::Store;

#[cfg(test)]
mod mock;
