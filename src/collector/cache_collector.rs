// cache_collector.rs
use super::{DefaultCollector, SapCollector};
use crate::sapcontrol::{SapControl, SapError, ScrapeContext};
use async_trait::async_trait;
use prometheus::proto::MetricFamily;
use std::sync::Arc;

/// Exporter self-metrics: statistics and size of the instance and process caches.
pub struct CacheCollector {
    base: DefaultCollector,
    sap: Arc<SapControl>,
}

impl CacheCollector {
    pub fn new(sap: Arc<SapControl>) -> Self {
        let mut base = DefaultCollector::new("cache");
        base.set_descriptor("hits_total", "Cache reads answered from a live entry", &["cache"]);
        base.set_descriptor("misses_total", "Cache reads that ran a population", &["cache"]);
        base.set_descriptor("sets_total", "Populations that inserted a new key", &["cache"]);
        base.set_descriptor("updates_total", "Populations that replaced an expired entry", &["cache"]);
        base.set_descriptor("deletes_total", "Entries removed explicitly or by the cleanup sweep", &["cache"]);
        base.set_descriptor("expired_total", "Expired entries found on read", &["cache"]);
        base.set_descriptor("entries", "Entries currently held, expired ones included", &["cache"]);
        Self { base, sap }
    }
}

#[async_trait]
impl SapCollector for CacheCollector {
    fn name(&self) -> &str {
        self.base.subsystem()
    }

    async fn collect(&self, _ctx: &ScrapeContext) -> Result<Vec<MetricFamily>, SapError> {
        let mut buffer = self.base.buffer();
        for report in self.sap.cache_reports().await {
            let labels = [report.cache.to_string()];
            let stats = report.stats;
            buffer.counter("hits_total", stats.hits as f64, &labels);
            buffer.counter("misses_total", stats.misses as f64, &labels);
            buffer.counter("sets_total", stats.sets as f64, &labels);
            buffer.counter("updates_total", stats.updates as f64, &labels);
            buffer.counter("deletes_total", stats.deletes as f64, &labels);
            buffer.counter("expired_total", stats.expired as f64, &labels);
            buffer.gauge("entries", report.entries as f64, &labels);
        }
        Ok(buffer.into_families())
    }
}
