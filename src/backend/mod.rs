//! Collaborators the application delegates to: authentication, the row
//! store, and object storage. Handlers and services only see the traits.

pub mod auth;
pub mod memory;
pub mod postgres;
pub mod rows;
pub mod storage;

pub use auth::{AuthEvent, AuthIdentity, AuthProvider, AuthSession, AuthSubscription, TokenAuthProvider};
pub use memory::MemoryRowStore;
pub use postgres::PgRowStore;
pub use rows::{ComplaintChanges, ComplaintFilter, RowStore};
pub use storage::{LocalObjectStorage, ObjectStorage};
