//! Application services layer.

pub mod error;
pub mod forum;
pub mod repos;
