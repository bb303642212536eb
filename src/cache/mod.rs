//! Cache Module
//!
//! Provides a concurrent loading cache with TTL expiration, sampled LRU
//! eviction and single-flight loads.

mod clock;
mod entry;
mod eviction;
mod expiry;
mod loader;
mod loading;
mod stats;
mod store;


// Re-export public types
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use entry::Entry;
pub use eviction::SampledLru;
pub use expiry::ExpirationPolicy;
pub use loader::{Follower, LoadCoordinator, LoadTicket, Registration};
pub use loading::LoadingCache;
pub use stats::{CacheStatsSnapshot, StatsRecorder};
pub use store::{EntryStore, Lookup};
