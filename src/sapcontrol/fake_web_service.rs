// In-memory WebService used by the cache and collector tests
use super::instance_cache::instance_endpoint;
use super::sap_error::SapError;
use super::scrape_context::ScrapeContext;
use super::soap_types::*;
use super::web_service::WebService;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

pub const TEST_DOMAIN: &str = "corp.local";

pub struct FakeWebService {
    pub instances: Vec<SapInstance>,
    pub sid: String,
    pub fail_list: AtomicBool,
    pub failing_endpoints: HashSet<String>,
    pub processes: HashMap<String, Vec<OsProcess>>,
    pub queues: Vec<TaskHandlerQueue>,
    pub alerts: Vec<Alert>,
    pub work_processes: Vec<WorkProcess>,
    pub enq: EnqGetStatisticResponse,
    pub delay: Duration,
    pub slow_endpoints: HashMap<String, Duration>,
    pub list_calls: AtomicUsize,
    pub property_calls: AtomicUsize,
    pub process_calls: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    in_flight: AtomicUsize,
    names: HashMap<String, String>,
}

pub fn endpoint_of(nr: usize) -> String {
    format!("http://sapapp{}.{}:{}", nr, TEST_DOMAIN, 50013 + nr * 100)
}

pub fn process(name: &str, color: &str) -> OsProcess {
    OsProcess {
        name: name.to_string(),
        description: format!("{} process", name),
        dispstatus: color.to_string(),
        textstatus: "Running".to_string(),
        starttime: "2025 03 01 10:00:00".to_string(),
        elapsedtime: "10:00:00".to_string(),
        pid: 1000,
    }
}

impl FakeWebService {
    /// `n` ABAP instances sapapp0..sapappN, all resolving to SID "PRD".
    pub fn with_instances(n: usize) -> Self {
        let instances: Vec<SapInstance> = (0..n)
            .map(|nr| SapInstance {
                hostname: format!("sapapp{}", nr),
                instance_nr: nr as i32,
                http_port: (50013 + nr * 100) as i32,
                https_port: (50014 + nr * 100) as i32,
                start_priority: "3".to_string(),
                features: "ABAP|GATEWAY|ICMAN|IGS".to_string(),
                dispstatus: "SAPControl-GREEN".to_string(),
            })
            .collect();
        let names = instances
            .iter()
            .map(|i| {
                (
                    instance_endpoint(i, false, TEST_DOMAIN),
                    format!("D{:02}", i.instance_nr),
                )
            })
            .collect();
        Self {
            instances,
            sid: "PRD".to_string(),
            fail_list: AtomicBool::new(false),
            failing_endpoints: HashSet::new(),
            processes: HashMap::new(),
            queues: Vec::new(),
            alerts: Vec::new(),
            work_processes: Vec::new(),
            enq: EnqGetStatisticResponse::default(),
            delay: Duration::ZERO,
            slow_endpoints: HashMap::new(),
            list_calls: AtomicUsize::new(0),
            property_calls: AtomicUsize::new(0),
            process_calls: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            names,
        }
    }

    pub fn failing(mut self, nrs: &[usize]) -> Self {
        self.failing_endpoints = nrs.iter().map(|nr| endpoint_of(*nr)).collect();
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Delays calls to one instance only, overriding `delay`.
    pub fn slow(mut self, nr: usize, delay: Duration) -> Self {
        self.slow_endpoints.insert(endpoint_of(nr), delay);
        self
    }

    // simulated latency, bounded by the scrape deadline like a real call
    async fn pause(&self, ctx: &ScrapeContext, operation: &str, endpoint: &str) -> Result<(), SapError> {
        let delay = self.slow_endpoints.get(endpoint).copied().unwrap_or(self.delay);
        if delay.is_zero() {
            return Ok(());
        }
        ctx.run(operation, async {
            tokio::time::sleep(delay).await;
            Ok(())
        })
        .await
    }

    fn check(&self, operation: &str, endpoint: &str) -> Result<(), SapError> {
        if self.failing_endpoints.contains(endpoint) {
            return Err(SapError::Request(format!(
                "{} failed, endpoint={}, err=connection refused",
                operation, endpoint
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl WebService for FakeWebService {
    async fn list_system_instances(
        &self,
        ctx: &ScrapeContext,
    ) -> Result<GetSystemInstanceListResponse, SapError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.pause(ctx, "GetSystemInstanceList", "").await?;
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(SapError::NoInstances("central instance unreachable".to_string()));
        }
        Ok(GetSystemInstanceListResponse {
            instances: self.instances.clone(),
        })
    }

    async fn get_instance_properties(
        &self,
        ctx: &ScrapeContext,
        endpoint: &str,
    ) -> Result<GetInstancePropertiesResponse, SapError> {
        self.property_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let paused = self.pause(ctx, "GetInstanceProperties", endpoint).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        paused?;

        self.check("GetInstanceProperties", endpoint)?;
        let name = self.names.get(endpoint).cloned().unwrap_or_default();
        let prop = |property: &str, value: &str| InstanceProperty {
            property: property.to_string(),
            property_type: "Attribute".to_string(),
            value: value.to_string(),
        };
        Ok(GetInstancePropertiesResponse {
            properties: vec![prop("SAPSYSTEMNAME", &self.sid), prop("INSTANCE_NAME", &name)],
        })
    }

    async fn get_process_list(
        &self,
        ctx: &ScrapeContext,
        endpoint: &str,
    ) -> Result<GetProcessListResponse, SapError> {
        self.process_calls.fetch_add(1, Ordering::SeqCst);
        self.pause(ctx, "GetProcessList", endpoint).await?;
        self.check("GetProcessList", endpoint)?;
        Ok(GetProcessListResponse {
            processes: self.processes.get(endpoint).cloned().unwrap_or_default(),
        })
    }

    async fn get_queue_statistic(
        &self,
        _ctx: &ScrapeContext,
        endpoint: &str,
    ) -> Result<GetQueueStatisticResponse, SapError> {
        self.check("GetQueueStatistic", endpoint)?;
        Ok(GetQueueStatisticResponse {
            queues: self.queues.clone(),
        })
    }

    async fn get_alerts(
        &self,
        _ctx: &ScrapeContext,
        endpoint: &str,
    ) -> Result<GetAlertsResponse, SapError> {
        self.check("GetAlerts", endpoint)?;
        Ok(GetAlertsResponse {
            root_tid_name: String::new(),
            alerts: self.alerts.clone(),
        })
    }

    async fn abap_get_wp_table(
        &self,
        _ctx: &ScrapeContext,
        endpoint: &str,
    ) -> Result<AbapGetWpTableResponse, SapError> {
        self.check("ABAPGetWPTable", endpoint)?;
        Ok(AbapGetWpTableResponse {
            work_processes: self.work_processes.clone(),
        })
    }

    async fn enq_get_statistic(
        &self,
        _ctx: &ScrapeContext,
        endpoint: &str,
    ) -> Result<EnqGetStatisticResponse, SapError> {
        self.check("EnqGetStatistic", endpoint)?;
        Ok(self.enq.clone())
    }
}
