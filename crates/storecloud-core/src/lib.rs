//! Storecloud Core Library
//!
//! This crate provides the backend-agnostic storage model shared by every
//! storecloud component: the `StorageObject` value, its typed property bag,
//! well-known property names, the error taxonomy and configuration.

pub mod config;
pub mod error;
pub mod file;
pub mod object;
pub mod property_names;
pub mod store_type;

// Re-export commonly used types
pub use config::StoreConfig;
pub use error::{ErrorKind, LogLevel, StorageError, StorageResult};
pub use file::StorageFile;
pub use object::{FromPropertyValue, Metadata, PropertyValue, StorageObject};
pub use property_names::{BaseType, StoragePropertyNames};
pub use store_type::StoreType;
