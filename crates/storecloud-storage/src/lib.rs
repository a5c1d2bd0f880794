//! Storecloud Storage Library
//!
//! This crate provides the `StorageDriver` capability trait and the bundled
//! drivers: a filesystem driver and an in-memory repository driver.
//!
//! # Path format
//!
//! Paths are `/`-separated and absolute; the repository root is `/`. An
//! empty path also means the root, and `\` is accepted as a separator on
//! input. Segments `.` and `..` are rejected. Path handling is centralized in
//! the `paths` module so all drivers stay consistent.

pub mod factory;
#[cfg(feature = "storage-filesystem")]
pub mod filesystem;
#[cfg(feature = "storage-memory")]
pub mod memory;
pub mod paths;
pub mod traits;

// Re-export commonly used types
pub use factory::create_driver;
#[cfg(feature = "storage-filesystem")]
pub use filesystem::FilesystemDriver;
#[cfg(feature = "storage-memory")]
pub use memory::MemoryDriver;
pub use storecloud_core::{StorageError, StorageResult, StoreType};
pub use traits::{reader_from_bytes, ContentReader, ContentStream, StorageDriver};
