mod in_memory_session_collection;
mod migrations;
mod postgres_session_collection;

pub use in_memory_session_collection::*;
pub use migrations::*;
pub use postgres_session_collection::*;
