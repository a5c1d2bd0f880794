//! Storecloud Services Library
//!
//! Backend-agnostic facade over a single configured `StorageDriver`.

pub mod store_service;

pub use store_service::StoreService;
