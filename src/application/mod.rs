//! Application services layer.

pub mod error;
pub mod jobs;
pub mod posts;
pub mod progress;
pub mod repos;
