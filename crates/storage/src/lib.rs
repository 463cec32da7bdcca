pub mod error;
pub mod memory;
pub mod schema;
pub mod sqlite;
pub mod traits;

pub use error::{GatewayError, StorageError};
pub use memory::MemoryKeyValueStore;
pub use sqlite::{SqliteCollection, SqliteKeyValueStore};
pub use traits::*;
