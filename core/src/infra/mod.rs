//! Infrastructure layer - store, encoding, scheduling and dead-letter plumbing

pub mod codec;
pub mod db;
pub mod dead_letter;
pub mod scheduler;
