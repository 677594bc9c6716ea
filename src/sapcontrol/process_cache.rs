// Per-instance process list cache, keyed by instance endpoint
use super::instance_cache::CacheSettings;
use super::sap_error::SapError;
use super::scrape_context::ScrapeContext;
use super::soap_types::{state_color_to_float, OsProcess};
use super::web_service::WebService;
use crate::cache::{CacheStatsSnapshot, TtlCache};
use log::{debug, error, warn};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct ProcessInfo {
    pub process: OsProcess,
    pub status: f64,
}

pub fn process_cache_key(endpoint: &str) -> String {
    format!("ProcessList_{}", endpoint)
}

pub struct ProcessCache {
    web_service: Arc<dyn WebService>,
    cache: TtlCache<Option<Arc<Vec<ProcessInfo>>>>,
    settings: CacheSettings,
}

impl ProcessCache {
    pub fn new(web_service: Arc<dyn WebService>, settings: CacheSettings) -> Self {
        Self {
            web_service,
            cache: TtlCache::new("processes"),
            settings,
        }
    }

    pub async fn get_cached_process_list(
        &self,
        ctx: &ScrapeContext,
        endpoint: &str,
    ) -> Result<Arc<Vec<ProcessInfo>>, SapError> {
        debug!("GetCachedProcessList start, url = {}", endpoint);
        let value = self
            .cache
            .get_or_set(&process_cache_key(endpoint), || async {
                match self.get_processes(ctx, endpoint).await {
                    Ok(processes) => (Some(Arc::new(processes)), self.settings.ttl),
                    Err(err) => {
                        error!("GetCachedProcessList: {}", err);
                        (None, self.settings.error_ttl)
                    }
                }
            })
            .await;
        value.ok_or_else(|| {
            SapError::CacheRetrieval(format!("GetCachedProcessList: no process list for {}", endpoint))
        })
    }

    pub async fn get_processes(
        &self,
        ctx: &ScrapeContext,
        endpoint: &str,
    ) -> Result<Vec<ProcessInfo>, SapError> {
        let list = self
            .web_service
            .get_process_list(ctx, endpoint)
            .await
            .map_err(|e| e.context("GetProcesses"))?;
        debug!("Processes in the list: {}", list.processes.len());

        Ok(list
            .processes
            .into_iter()
            .map(|process| {
                let status = state_color_to_float(&process.dispstatus).unwrap_or_else(|(fallback, err)| {
                    warn!("Process status error, url {}: {}", endpoint, err);
                    fallback
                });
                ProcessInfo { process, status }
            })
            .collect())
    }

    pub async fn purge_expired(&self) -> usize {
        self.cache.purge_expired().await
    }

    pub async fn entries(&self) -> usize {
        self.cache.len().await
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.cache.stats()
    }
}
