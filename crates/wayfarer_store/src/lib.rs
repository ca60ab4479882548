pub mod kv;
pub mod remote;
pub mod settings;

pub use kv::{LocalStore, MemoryLocalStore, SqliteLocalStore};
pub use remote::{MemoryRemoteStore, RemoteStore, SqliteRemoteStore};
pub use settings::SettingsStore;
