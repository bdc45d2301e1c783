//! A content-addressable cache of files.
//!
//! Files are identified by the SHA-256 of their bytes. Each distinct content
//! is stored once as a [`Digest`] with descriptive attributes and thumbnails;
//! filesystem paths point at the digest of their current content, and tags
//! form a graph over both tags and content.

pub mod database;
pub mod error;
pub mod ingest;
pub mod media;
pub mod utils;

pub use database::{Digest, Store};
pub use error::{CacheError, Result};
pub use ingest::CacheCoordinator;
