// dispatcher.rs
use super::{labels_with, DefaultCollector, SapCollector, INSTANCE_LABELS};
use crate::sapcontrol::{SapControl, SapError, ScrapeContext};
use async_trait::async_trait;
use log::{debug, warn};
use prometheus::proto::MetricFamily;
use std::sync::Arc;

const DISPATCHER_PROCESS: &str = "disp+work";

/// Work process queue statistics of every instance running a dispatcher.
pub struct DispatcherCollector {
    base: DefaultCollector,
    sap: Arc<SapControl>,
}

impl DispatcherCollector {
    pub fn new(sap: Arc<SapControl>) -> Self {
        let mut base = DefaultCollector::new("dispatcher");
        let mut labels = vec!["type"];
        labels.extend(INSTANCE_LABELS);
        base.set_descriptor("queue_now", "Work process current queue length", &labels);
        base.set_descriptor("queue_high", "Work process peak queue length", &labels);
        base.set_descriptor("queue_max", "Work process maximum queue length", &labels);
        base.set_descriptor("queue_writes", "Work process queue writes", &labels);
        base.set_descriptor("queue_reads", "Work process queue reads", &labels);
        Self { base, sap }
    }

    async fn runs_dispatcher(&self, ctx: &ScrapeContext, endpoint: &str) -> Result<bool, SapError> {
        let processes = self.sap.get_cached_process_list(ctx, endpoint).await?;
        Ok(processes
            .iter()
            .any(|p| p.process.name.contains(DISPATCHER_PROCESS)))
    }
}

#[async_trait]
impl SapCollector for DispatcherCollector {
    fn name(&self) -> &str {
        self.base.subsystem()
    }

    async fn collect(&self, ctx: &ScrapeContext) -> Result<Vec<MetricFamily>, SapError> {
        debug!("recordWorkProcessQueueStats collecting");
        let directory = self
            .sap
            .get_cached_instance_list(ctx)
            .await
            .map_err(|e| e.context("recordWorkProcessQueueStats collector error"))?;
        debug!(
            "recordWorkProcessQueueStats: Instances in the list: {}",
            directory.len()
        );

        let mut buffer = self.base.buffer();
        for info in directory.iter() {
            match self.runs_dispatcher(ctx, &info.endpoint).await {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    warn!("GetProcessList error, instance {}: {}", info.endpoint, e);
                    continue;
                }
            }

            let statistic = match self
                .sap
                .web_service()
                .get_queue_statistic(ctx, &info.endpoint)
                .await
            {
                Ok(statistic) => statistic,
                Err(e) => {
                    warn!("GetQueueStatistic error, instance {}: {}", info.endpoint, e);
                    continue;
                }
            };

            let common = info.common_labels();
            for queue in &statistic.queues {
                let labels = labels_with(&[queue.queue_type.as_str()], &common);
                buffer.gauge("queue_now", queue.now as f64, &labels);
                buffer.counter("queue_high", queue.high as f64, &labels);
                buffer.gauge("queue_max", queue.max as f64, &labels);
                buffer.counter("queue_writes", queue.writes as f64, &labels);
                buffer.counter("queue_reads", queue.reads as f64, &labels);
            }
        }
        Ok(buffer.into_families())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::test_util::*;
    use crate::sapcontrol::fake_web_service::{endpoint_of, process, FakeWebService};
    use crate::sapcontrol::soap_types::TaskHandlerQueue;

    fn queue(queue_type: &str, now: i32, high: i32) -> TaskHandlerQueue {
        TaskHandlerQueue {
            queue_type: queue_type.to_string(),
            now,
            high,
            max: 14000,
            writes: 5120,
            reads: 5118,
        }
    }

    #[tokio::test]
    async fn test_only_dispatcher_instances_are_queried() {
        let mut fake = FakeWebService::with_instances(2);
        fake.processes
            .insert(endpoint_of(0), vec![process("disp+work", "SAPControl-GREEN")]);
        fake.processes
            .insert(endpoint_of(1), vec![process("enserver", "SAPControl-GREEN")]);
        fake.queues = vec![queue("ABAP/NOWP", 0, 3), queue("ABAP/DIA", 2, 8)];
        let (_, sap) = sap_control(fake);
        let collector = DispatcherCollector::new(sap);

        let families = collector.collect(&ctx()).await.unwrap();
        assert_eq!(series(&families, "sap_dispatcher_queue_now"), 2);
        assert_eq!(
            value(
                &families,
                "sap_dispatcher_queue_now",
                &[("type", "ABAP/DIA"), ("instance_name", "D00")]
            ),
            Some(2.0)
        );
        assert_eq!(
            value(&families, "sap_dispatcher_queue_high", &[("type", "ABAP/DIA")]),
            Some(8.0)
        );
        assert_eq!(value(&families, "sap_dispatcher_queue_reads", &[]), Some(5118.0));
        assert!(value(&families, "sap_dispatcher_queue_now", &[("instance_name", "D01")]).is_none());
    }

    #[tokio::test]
    async fn test_no_dispatcher_no_families() {
        let (_, sap) = sap_control(FakeWebService::with_instances(2));
        let collector = DispatcherCollector::new(sap);

        let families = collector.collect(&ctx()).await.unwrap();
        assert!(families.is_empty());
    }
}
