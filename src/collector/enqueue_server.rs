// enqueue_server.rs
use super::{DefaultCollector, MetricBuffer, SapCollector, INSTANCE_LABELS};
use crate::sapcontrol::soap_types::{state_color_to_float, EnqGetStatisticResponse};
use crate::sapcontrol::{SapControl, SapError, ScrapeContext};
use async_trait::async_trait;
use log::{debug, warn};
use prometheus::proto::MetricFamily;
use std::sync::Arc;

const GAUGES: [(&str, &str); 9] = [
    ("owner_now", "Current number of lock owners in the lock table"),
    ("owner_high", "Peak number of lock owners in the lock table"),
    ("owner_max", "Maximum number of lock owners in the lock table"),
    ("arguments_now", "Current number of lock arguments in the lock table"),
    ("arguments_high", "Peak number of lock arguments in the lock table"),
    ("arguments_max", "Maximum number of lock arguments in the lock table"),
    ("locks_now", "Current number of elementary locks in the lock table"),
    ("locks_high", "Peak number of elementary locks in the lock table"),
    ("locks_max", "Maximum number of elementary locks in the lock table"),
];

const STATES: [(&str, &str); 4] = [
    ("owner_state", "General state of the lock owner table"),
    ("arguments_state", "General state of the lock argument table"),
    ("locks_state", "General state of the elementary lock table"),
    ("replication_state", "General state of lock server replication"),
];

const COUNTERS: [(&str, &str); 14] = [
    ("enqueue_requests", "Lock acquisition requests"),
    ("enqueue_rejects", "Rejected lock requests"),
    ("enqueue_errors", "Lock acquisition errors"),
    ("dequeue_requests", "Lock release requests"),
    ("dequeue_errors", "Lock release errors"),
    ("dequeue_all_requests", "Requests to release all the locks of a LUW"),
    ("cleanup_requests", "Requests to release all the locks of an application server"),
    ("backup_requests", "Number of update requests written to the backup file"),
    ("reporting_requests", "Number of reading operations on the lock table"),
    ("compress_requests", "Internal lock table compression requests"),
    ("verify_requests", "Internal verification requests of the update process"),
    ("lock_time", "Total time spent in the lock table, in seconds"),
    ("lock_wait_time", "Total wait time of all threads for the lock table, in seconds"),
    ("server_time", "Total time spent in the enqueue server, in seconds"),
];

/// Lock table statistics of every instance with the ENQUE feature.
pub struct EnqueueServerCollector {
    base: DefaultCollector,
    sap: Arc<SapControl>,
}

impl EnqueueServerCollector {
    pub fn new(sap: Arc<SapControl>) -> Self {
        let mut base = DefaultCollector::new("enqueue_server");
        for (name, help) in GAUGES.iter().chain(STATES.iter()).chain(COUNTERS.iter()) {
            base.set_descriptor(name, help, &INSTANCE_LABELS);
        }
        Self { base, sap }
    }
}

fn record_statistic(buffer: &mut MetricBuffer<'_>, stat: &EnqGetStatisticResponse, common: &[String]) {
    let gauges = [
        stat.owner_now,
        stat.owner_high,
        stat.owner_max,
        stat.arguments_now,
        stat.arguments_high,
        stat.arguments_max,
        stat.locks_now,
        stat.locks_high,
        stat.locks_max,
    ];
    for ((name, _), value) in GAUGES.iter().zip(gauges) {
        buffer.gauge(name, value as f64, common);
    }

    let states = [
        &stat.owner_state,
        &stat.arguments_state,
        &stat.locks_state,
        &stat.replication_state,
    ];
    for ((name, _), state) in STATES.iter().zip(states) {
        // older kernels leave replication_state empty
        if state.is_empty() {
            continue;
        }
        match state_color_to_float(state) {
            Ok(value) => buffer.gauge(name, value, common),
            Err((_, e)) => warn!("EnqGetStatistic {}: {}", name, e),
        }
    }

    let counters = [
        stat.enqueue_requests as f64,
        stat.enqueue_rejects as f64,
        stat.enqueue_errors as f64,
        stat.dequeue_requests as f64,
        stat.dequeue_errors as f64,
        stat.dequeue_all_requests as f64,
        stat.cleanup_requests as f64,
        stat.backup_requests as f64,
        stat.reporting_requests as f64,
        stat.compress_requests as f64,
        stat.verify_requests as f64,
        stat.lock_time,
        stat.lock_wait_time,
        stat.server_time,
    ];
    for ((name, _), value) in COUNTERS.iter().zip(counters) {
        buffer.counter(name, value, common);
    }
}

#[async_trait]
impl SapCollector for EnqueueServerCollector {
    fn name(&self) -> &str {
        self.base.subsystem()
    }

    async fn collect(&self, ctx: &ScrapeContext) -> Result<Vec<MetricFamily>, SapError> {
        debug!("Collecting Enqueue Server metrics");
        let directory = self
            .sap
            .get_cached_instance_list(ctx)
            .await
            .map_err(|e| e.context("recordEnqStatistic collector error"))?;

        let mut buffer = self.base.buffer();
        for info in directory.iter().filter(|i| i.has_feature("ENQUE")) {
            match self.sap.web_service().enq_get_statistic(ctx, &info.endpoint).await {
                Ok(stat) => record_statistic(&mut buffer, &stat, &info.common_labels()),
                Err(e) => warn!("EnqGetStatistic error, instance {}: {}", info.endpoint, e),
            }
        }
        Ok(buffer.into_families())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::test_util::*;
    use crate::sapcontrol::fake_web_service::FakeWebService;

    #[tokio::test]
    async fn test_enqueue_statistic() {
        let mut fake = FakeWebService::with_instances(2);
        fake.instances[1].features = "MESSAGESERVER|ENQUE".to_string();
        fake.enq = EnqGetStatisticResponse {
            owner_now: 3,
            owner_high: 12,
            owner_max: 14000,
            owner_state: "SAPControl-GREEN".to_string(),
            locks_state: "SAPControl-YELLOW".to_string(),
            arguments_state: "SAPControl-GREEN".to_string(),
            enqueue_requests: 4711,
            lock_time: 1.5,
            ..Default::default()
        };
        let (_, sap) = sap_control(fake);
        let collector = EnqueueServerCollector::new(sap);

        let families = collector.collect(&ctx()).await.unwrap();
        assert_eq!(series(&families, "sap_enqueue_server_owner_now"), 1);
        assert_eq!(
            value(&families, "sap_enqueue_server_owner_high", &[("instance_name", "D01")]),
            Some(12.0)
        );
        assert_eq!(value(&families, "sap_enqueue_server_locks_state", &[]), Some(3.0));
        assert_eq!(value(&families, "sap_enqueue_server_enqueue_requests", &[]), Some(4711.0));
        assert_eq!(value(&families, "sap_enqueue_server_lock_time", &[]), Some(1.5));
        assert_eq!(series(&families, "sap_enqueue_server_replication_state"), 0);
    }

    #[tokio::test]
    async fn test_without_enqueue_instances() {
        let (_, sap) = sap_control(FakeWebService::with_instances(2));
        let collector = EnqueueServerCollector::new(sap);
        assert!(collector.collect(&ctx()).await.unwrap().is_empty());
    }
}
