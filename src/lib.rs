//! Parlor: read-through caching and cascading invalidation for a relational
//! discussion forum.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
