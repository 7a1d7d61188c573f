//! Quire: a tagged, versioned read-through cache and task progress store
//! for a self-hosted publishing platform.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
