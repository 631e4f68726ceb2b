//! `DynamoDB` user storage
//!
//! Maps the [`User`] entity to and from `DynamoDB` attribute maps and runs
//! the reads and writes of the users table: paginated scans and last name
//! index queries, chunked batch gets and optimistic concurrency updates
//! guarded by `lastModified`.

#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    dead_code
)]

pub mod batch;
pub mod codec;
pub mod environment;
pub mod pagination;
pub mod store;
pub mod update;
pub mod user;

pub use environment::{Environment, StorageSettings};
pub use user::{
    Address, Education, Gender, User, UserAttribute, UserStorage, UserStorageError,
    UserStorageResult,
};
