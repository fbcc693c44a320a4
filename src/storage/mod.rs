pub mod cached;
pub mod memory;
pub mod sqlite;
pub mod trait_def;

pub use cached::CachedStorage;
pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;
pub use trait_def::{NewLink, Storage, StorageError, StorageResult};
