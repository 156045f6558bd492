#![forbid(unsafe_code)]

pub mod local;
pub mod remote;
pub mod repository;
pub mod sqlite;

pub use repository::{Storage, StorageError};
