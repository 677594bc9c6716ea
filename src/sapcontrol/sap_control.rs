// sap_control.rs
use super::instance_cache::{CacheSettings, InstanceDirectory, InstanceDirectoryCache};
use super::process_cache::{ProcessCache, ProcessInfo};
use super::sap_error::SapError;
use super::scrape_context::ScrapeContext;
use super::web_service::WebService;
use crate::cache::CacheStatsSnapshot;
use crate::config::SidSlot;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Web service plus the two caches in front of it. Shared by all collectors.
pub struct SapControl {
    web_service: Arc<dyn WebService>,
    instances: InstanceDirectoryCache,
    processes: ProcessCache,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheReport {
    pub cache: &'static str,
    pub entries: usize,
    pub stats: CacheStatsSnapshot,
}

impl SapControl {
    pub fn new(web_service: Arc<dyn WebService>, settings: CacheSettings, sid: SidSlot) -> Self {
        Self {
            instances: InstanceDirectoryCache::new(web_service.clone(), settings.clone(), sid),
            processes: ProcessCache::new(web_service.clone(), settings),
            web_service,
        }
    }

    pub fn web_service(&self) -> &dyn WebService {
        self.web_service.as_ref()
    }

    pub async fn get_cached_instance_list(
        &self,
        ctx: &ScrapeContext,
    ) -> Result<Arc<InstanceDirectory>, SapError> {
        self.instances.get_cached_instance_list(ctx).await
    }

    pub async fn get_cached_process_list(
        &self,
        ctx: &ScrapeContext,
        endpoint: &str,
    ) -> Result<Arc<Vec<ProcessInfo>>, SapError> {
        self.processes.get_cached_process_list(ctx, endpoint).await
    }

    pub fn sid(&self) -> Option<&str> {
        self.instances.sid().get()
    }

    pub async fn cache_reports(&self) -> Vec<CacheReport> {
        vec![
            CacheReport {
                cache: "instances",
                entries: self.instances.entries().await,
                stats: self.instances.stats(),
            },
            CacheReport {
                cache: "processes",
                entries: self.processes.entries().await,
                stats: self.processes.stats(),
            },
        ]
    }

    pub async fn purge_expired(&self) -> usize {
        self.instances.purge_expired().await + self.processes.purge_expired().await
    }

    /// Periodically drops expired entries from both caches.
    pub fn spawn_cleanup(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let sap = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = sap.purge_expired().await;
                log::debug!("Cache cleanup removed {} entries", removed);
            }
        })
    }
}
