//! # doorman-memory
//!
//! In-memory implementations of the doorman storage traits. Data lives
//! in `RwLock`-wrapped maps and is lost on drop; the unique indexes and
//! cascade semantics of the SQL backend are enforced in process, which
//! makes this the backend of choice for tests and prototyping.

mod sessions;
mod store;

pub use sessions::MemorySessionStore;
pub use store::MemoryStore;
