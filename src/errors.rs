/*!

Error taxonomy for the secret-service client and store.

Every failure is surfaced to the caller; nothing in this crate retries.
Callers that need to tell "the user said no" apart from "the user never
answered" match on [`Error::PromptDismissed`] and [`Error::PromptTimedOut`].

 */

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The remote call itself failed (daemon unreachable, unknown object, malformed call).
    #[error("secret service call failed: {0}")]
    Transport(String),

    /// The daemon answered with something we could not interpret.
    #[error("bad response from secret service: {0}")]
    BadResponse(String),

    #[error("prompt dismissed")]
    PromptDismissed,

    #[error("prompt timed out after {0:?}")]
    PromptTimedOut(Duration),

    #[error("no matching secret found in secret service")]
    NoEntry,

    #[error("{0} secrets match a single identity")]
    Ambiguous(usize),

    #[error("unsupported session algorithm: {0}")]
    UnsupportedMode(String),

    #[error("session crypto failure: {0}")]
    Crypto(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("stored secret has length {0}, expected {len}", len = crate::cred::FULL_SECRET_LEN)]
    InvalidSecret(usize),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Map a failed remote call into the taxonomy.
pub fn platform_failure<E: std::fmt::Display>(err: E) -> Error {
    Error::Transport(err.to_string())
}

/// Map a decoding failure into the taxonomy.
pub fn decode_error<E: std::fmt::Display>(err: E) -> Error {
    Error::BadResponse(err.to_string())
}

impl From<Error> for keyring_core::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::NoEntry => keyring_core::Error::NoEntry,
            Error::InvalidSecret(len) => keyring_core::Error::Invalid(
                "secret".to_string(),
                format!("has length {len}, expected {}", crate::cred::FULL_SECRET_LEN),
            ),
            Error::Transport(_) | Error::PromptDismissed | Error::PromptTimedOut(_) => {
                keyring_core::Error::NoStorageAccess(Box::new(err))
            }
            other => keyring_core::Error::PlatformFailure(Box::new(other)),
        }
    }
}
