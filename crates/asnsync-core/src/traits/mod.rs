//! Core traits for the ASN sync system
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`DatasetSource`]: Fetch and fingerprint the range dataset
//! - [`TagRepository`]: Read and update tag membership via platform APIs
//! - [`StateStore`]: Persistent key/value state between runs

pub mod dataset_source;
pub mod tag_repository;
pub mod state_store;

pub use dataset_source::{DatasetSource, DatasetSourceFactory};
pub use tag_repository::{TagRepository, TagRepositoryFactory};
pub use state_store::{StateStore, StateRecord, StateStoreFactory};
