//! Cached directory of all instances of the SAP system.
//!
//! One population = one `GetSystemInstanceList` call on the central instance
//! followed by a concurrent `GetInstanceProperties` per instance to learn its
//! name and SID. Instances whose properties cannot be read stay in the
//! directory with a fallback name and the error attached.

use super::sap_error::SapError;
use super::scrape_context::ScrapeContext;
use super::soap_types::{state_color_to_float, GetInstancePropertiesResponse, SapInstance};
use super::web_service::WebService;
use crate::cache::{CacheStatsSnapshot, TtlCache};
use crate::config::exporter_config::DEFAULT_CACHE_TTL;
use crate::config::{ExporterConfig, SidSlot};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

pub const INSTANCE_CACHE_KEY: &str = "InstanceInfo";

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub use_tls: bool,
    pub host_domain: String,
    pub ttl: Duration,
    pub error_ttl: Duration,
    /// 0 = one task per instance, no cap
    pub fanout_limit: usize,
}

impl CacheSettings {
    pub fn from_config(config: &ExporterConfig) -> Self {
        Self {
            use_tls: config.use_tls,
            host_domain: config.host_domain.clone(),
            // zero would never expire
            ttl: if config.cache_ttl.is_zero() {
                DEFAULT_CACHE_TTL
            } else {
                config.cache_ttl
            },
            error_ttl: config.cache_error_ttl,
            fanout_limit: config.fanout_limit,
        }
    }
}

/// Base descriptor from the system instance list plus what the exporter learns about it.
#[derive(Debug, Clone)]
pub struct InstanceInfo {
    pub instance: SapInstance,
    pub name: String,
    pub sid: String,
    pub endpoint: String,
    pub status: f64,
    pub last_scrape: SystemTime,
    pub scrape_success: bool,
    pub last_error: Option<String>,
}

impl InstanceInfo {
    fn new(instance: SapInstance, endpoint: String, status: f64) -> Self {
        Self {
            instance,
            name: String::new(),
            sid: String::new(),
            endpoint,
            status,
            last_scrape: SystemTime::UNIX_EPOCH,
            scrape_success: false,
            last_error: None,
        }
    }

    fn apply_properties(&mut self, props: &GetInstancePropertiesResponse) {
        if let Some(sid) = props.get("SAPSYSTEMNAME") {
            self.sid = sid.to_string();
        }
        if let Some(name) = props.get("INSTANCE_NAME") {
            self.name = name.to_string();
        }
    }

    pub fn instance_nr_label(&self) -> String {
        self.instance.instance_nr.to_string()
    }

    /// instance_name, instance_number, SID, instance_hostname
    pub fn common_labels(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.instance_nr_label(),
            self.sid.clone(),
            self.instance.hostname.clone(),
        ]
    }

    pub fn has_feature(&self, feature: &str) -> bool {
        self.instance
            .features
            .to_ascii_uppercase()
            .contains(&feature.to_ascii_uppercase())
    }
}

/// One full system topology snapshot, replaced wholesale on refresh.
#[derive(Debug, Clone)]
pub struct InstanceDirectory {
    pub instances: Vec<InstanceInfo>,
    pub populated_at: SystemTime,
    pub ttl: Duration,
}

impl InstanceDirectory {
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, InstanceInfo> {
        self.instances.iter()
    }
}

/// Reachable URL of an instance's sapstartsrv.
pub fn instance_endpoint(instance: &SapInstance, use_tls: bool, host_domain: &str) -> String {
    let mut hostname = instance.hostname.clone();
    if !hostname.contains('.') && !host_domain.is_empty() {
        hostname = format!("{}.{}", hostname, host_domain);
    }
    if use_tls {
        format!("https://{}:{}", hostname, instance.https_port)
    } else {
        format!("http://{}:{}", hostname, instance.http_port)
    }
}

pub struct InstanceDirectoryCache {
    web_service: Arc<dyn WebService>,
    cache: TtlCache<Option<Arc<InstanceDirectory>>>,
    settings: CacheSettings,
    sid: SidSlot,
}

impl InstanceDirectoryCache {
    pub fn new(web_service: Arc<dyn WebService>, settings: CacheSettings, sid: SidSlot) -> Self {
        Self {
            web_service,
            cache: TtlCache::new("instances"),
            settings,
            sid,
        }
    }

    /// Current directory snapshot; refreshed at most once per TTL window.
    pub async fn get_cached_instance_list(
        &self,
        ctx: &ScrapeContext,
    ) -> Result<Arc<InstanceDirectory>, SapError> {
        debug!("GetCachedInstanceList start");
        let value = self
            .cache
            .get_or_set(INSTANCE_CACHE_KEY, || async {
                match self.get_all_instances(ctx).await {
                    Ok(directory) => (Some(Arc::new(directory)), self.settings.ttl),
                    Err(err) => {
                        error!("GetCachedInstanceList: {}", err);
                        (None, self.settings.error_ttl)
                    }
                }
            })
            .await;
        value.ok_or_else(|| {
            SapError::CacheRetrieval("GetCachedInstanceList: instance list unavailable".to_string())
        })
    }

    /// Uncached population: system list, concurrent property resolution, SID backfill.
    pub async fn get_all_instances(&self, ctx: &ScrapeContext) -> Result<InstanceDirectory, SapError> {
        debug!("GetAllInstances (cache callback) start");
        let list = self
            .web_service
            .list_system_instances(ctx)
            .await
            .map_err(|e| e.context("GetAllInstances"))?;

        let n = list.instances.len();
        debug!("Instances in the list: {}", n);

        let limiter = match self.settings.fanout_limit {
            0 => None,
            limit => Some(Arc::new(Semaphore::new(limit))),
        };

        let mut records = Vec::with_capacity(n);
        let mut tasks = JoinSet::new();
        for (idx, instance) in list.instances.into_iter().enumerate() {
            let endpoint = instance_endpoint(&instance, self.settings.use_tls, &self.settings.host_domain);
            debug!(" Instance props url: {}", endpoint);
            let status = state_color_to_float(&instance.dispstatus).unwrap_or_else(|(fallback, err)| {
                warn!("Instance url {}: {}", endpoint, err);
                fallback
            });

            let web_service = self.web_service.clone();
            let limiter = limiter.clone();
            let ctx = *ctx;
            let task_endpoint = endpoint.clone();
            tasks.spawn(async move {
                let _permit = match limiter {
                    Some(semaphore) => semaphore.acquire_owned().await.ok(),
                    None => None,
                };
                let result = web_service.get_instance_properties(&ctx, &task_endpoint).await;
                (idx, result)
            });
            records.push(InstanceInfo::new(instance, endpoint, status));
        }

        let mut outcomes: Vec<Option<Result<GetInstancePropertiesResponse, SapError>>> =
            (0..n).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, result)) => outcomes[idx] = Some(result),
                Err(err) => error!("GetAllInstances: property resolution task failed: {}", err),
            }
        }

        let now = SystemTime::now();
        for (record, outcome) in records.iter_mut().zip(outcomes) {
            record.last_scrape = now;
            let outcome = outcome.unwrap_or_else(|| {
                Err(SapError::Request("property resolution task did not finish".to_string()))
            });
            match outcome {
                Ok(props) => {
                    record.apply_properties(&props);
                    record.scrape_success = true;
                    if self.sid.fill(&record.sid) {
                        info!("SAP SID set from instance {}: {}", record.endpoint, record.sid);
                    }
                }
                Err(err) => {
                    let err = err.context("GetSingleInstance");
                    error!(
                        "GetAllInstances: properties for instance {}: {}",
                        record.instance.instance_nr, err
                    );
                    record.name = record.instance_nr_label();
                    record.last_error = Some(err.to_string());
                }
            }
        }

        // failed instances borrow the system-wide SID
        let sid = self.sid.get().unwrap_or_default().to_string();
        for record in records.iter_mut().filter(|r| !r.scrape_success) {
            record.sid = sid.clone();
        }

        debug!("GetAllInstances (cache callback) success");
        Ok(InstanceDirectory {
            instances: records,
            populated_at: now,
            ttl: self.settings.ttl,
        })
    }

    pub fn sid(&self) -> &SidSlot {
        &self.sid
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
