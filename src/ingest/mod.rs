pub mod coordinator;
pub mod hasher;
pub mod jobs;
pub mod scanner;

pub use coordinator::CacheCoordinator;
pub use hasher::{hash_reader, hash_size, HashSize};
