//! Parlor Cache System
//!
//! In-process read-through caches in front of the forum store:
//!
//! - **Counts**: scalar aggregates by (kind, scope)
//! - **Collections**: ordered topic and post lists by (kind, scope)
//! - **Identity**: user records reachable by id, username and email
//!
//! Entries never expire. Every write path reports a [`ForumEvent`] to the
//! [`InvalidationCoordinator`], which drops the full set of dependent entries.
//!
//! ## Configuration
//!
//! Capacities are controlled via `parlor.toml`:
//!
//! ```toml
//! [cache]
//! counts_limit = 1024
//! topic_lists_limit = 128
//! post_lists_limit = 128
//! users_limit = 128
//! ```

mod collections;
mod config;
mod context;
mod coordinator;
mod counts;
mod events;
mod identity;
mod keys;
mod lock;
mod memo;
mod planner;

pub use collections::{CollectionCache, PostList, TopicList};
pub use config::CacheConfig;
pub use context::ForumCache;
pub use coordinator::InvalidationCoordinator;
pub use counts::CountCache;
pub use events::ForumEvent;
pub use identity::IdentityCache;
pub use keys::{CategoryFootprint, CollectionKey, CountKey, TopicFootprint, user_count_keys};
pub use memo::{BoundedMemo, Generation};
pub use planner::InvalidationPlan;
