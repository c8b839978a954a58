pub mod catalog;
pub mod memory;
pub mod model;
pub mod sqlite;

pub use catalog::*;
pub use memory::MemoryCatalog;
pub use model::*;
pub use sqlite::SqliteRepository;
