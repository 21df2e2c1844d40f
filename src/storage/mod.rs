pub mod error;
pub mod schema;
pub mod store;

pub use error::{StorageError, StorageResult};
pub use schema::EntrySchema;
pub use store::{DEFAULT_WRITER_HEAP_BYTES, EntryAttributes, IndexStore};
