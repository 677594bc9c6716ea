pub mod cache_stats;
pub mod ttl_cache;

pub use cache_stats::CacheStatsSnapshot;
pub use ttl_cache::TtlCache;
