//! Core data models for the bucket store.
//!
//! Objects live as plain files inside a bucket directory; their descriptive
//! record is serialized with `serde` into a sibling entry. Reads return the
//! types below, and the engine broadcasts `StorageEvent`s as it mutates the
//! namespace.

pub mod event;
pub mod meta;
pub mod object;
