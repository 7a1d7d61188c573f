//! Quire cache layer
//!
//! Read-through caching over an injected key-value capability:
//!
//! - **Keys**: structured [`CacheKey`]s serialized to tagged, escaped strings
//! - **Versions**: per-namespace generation counters for O(1) bulk invalidation
//! - **Background writes**: cache fills run detached from the caller, with a
//!   drain barrier for shutdown
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! enabled = true
//! default_ttl_seconds = 300
//! progress_ttl_seconds = 86400
//! version_key_prefix = "ver:"
//! ```

mod backend;
mod background;
mod codec;
mod config;
mod key;
mod service;
mod version;

pub use backend::{BackendError, CacheBackend, MemoryBackend, Ttl};
pub use background::BackgroundTasks;
pub use codec::{Codec, DecodeError, EncodeError, JsonCodec, TextCodec};
pub use config::CacheConfig;
pub use key::{CacheKey, KeyError, KeySegment, serialize_key};
pub use service::{CacheError, CacheService};
pub use version::VersionManager;
