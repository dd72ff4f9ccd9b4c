//! Store, read back, list, and clear a secret on the session bus.
//!
//! Run with `RUST_LOG=debug` to watch each call. `SECRET_STORE_*`
//! variables override the store configuration.

use secret_service_store::{FullSecret, Store, StoreConfig};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let store = Store::new(StoreConfig::from_env()?);
    let username = "example-user";
    let mut bytes = [0u8; 32];
    fastrand::fill(&mut bytes);
    let secret = FullSecret::new(bytes);

    store.store_secret(username, &secret)?;
    let retrieved = store.retrieve_secret(username)?;
    println!("round trip ok: {}", retrieved == secret);
    println!("users: {:?}", store.get_users_with_stored_secrets()?);
    store.clear_secret(username)?;
    println!("cleared {username}");
    Ok(())
}
