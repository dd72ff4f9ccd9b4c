// Definitions for secret service interactions

// DBus Name
pub const SS_DBUS_DEST: &str = "org.freedesktop.secrets";
pub const SS_DBUS_PATH: &str = "/org/freedesktop/secrets";
pub const SS_DEFAULT_COLLECTION: &str = "/org/freedesktop/secrets/aliases/default";

// A prompt path equal to this means no prompt is needed
pub const SS_NULL_PROMPT: &str = "/";

// Interfaces
pub const SS_INTERFACE_SERVICE: &str = "org.freedesktop.Secret.Service";
pub const SS_INTERFACE_COLLECTION: &str = "org.freedesktop.Secret.Collection";
pub const SS_INTERFACE_ITEM: &str = "org.freedesktop.Secret.Item";
pub const SS_INTERFACE_PROMPT: &str = "org.freedesktop.Secret.Prompt";
pub const DBUS_INTERFACE_PROPERTIES: &str = "org.freedesktop.DBus.Properties";

// Methods and signals
pub const SS_OPEN_SESSION: &str = "OpenSession";
pub const SS_SEARCH_ITEMS: &str = "SearchItems";
pub const SS_CREATE_ITEM: &str = "CreateItem";
pub const SS_DELETE: &str = "Delete";
pub const SS_GET_SECRET: &str = "GetSecret";
pub const SS_LOCK: &str = "Lock";
pub const SS_UNLOCK: &str = "Unlock";
pub const SS_PROMPT: &str = "Prompt";
pub const SS_PROMPT_COMPLETED: &str = "Completed";

// Item Properties
pub const SS_ITEM_LABEL: &str = "org.freedesktop.Secret.Item.Label";
pub const SS_ITEM_ATTRIBUTES: &str = "org.freedesktop.Secret.Item.Attributes";
pub const SS_ATTRIBUTES_PROPERTY: &str = "Attributes";

// Algorithm Names
pub const ALGORITHM_PLAIN: &str = "plain";
pub const ALGORITHM_DH: &str = "dh-ietf1024-sha256-aes128-cbc-pkcs7";

pub const CONTENT_TYPE: &str = "application/octet-stream";

// Window id handed to Prompt; empty means no parent window
pub const PROMPT_WINDOW_ID: &str = "";
