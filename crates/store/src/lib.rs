//! SQLite persistence for batchlink.
//!
//! Implements the store traits from `batchlink-core` on a shared
//! `sqlx::SqlitePool`. Each store owns its table and exposes an `init`
//! that creates the schema.

pub mod bundles;
pub mod channels;
pub mod sessions;

pub use {
    bundles::SqliteBundleStore, channels::SqliteChannelStore, sessions::SqliteSessionStore,
};

fn now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
