//! Persistence layer — task repository and worker/sector directory.

pub mod libsql_backend;
pub mod memory;
pub mod migrations;
pub mod open;
pub mod seed;
pub mod traits;

pub use libsql_backend::LibSqlStore;
pub use memory::MemoryStore;
pub use open::{Stores, open};
pub use seed::DirectorySeed;
pub use traits::{Directory, Repository, TaskStore};
