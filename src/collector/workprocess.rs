// workprocess.rs
use super::{labels_with, DefaultCollector, MetricBuffer, SapCollector, INSTANCE_LABELS};
use crate::sapcontrol::soap_types::WorkProcess;
use crate::sapcontrol::{SapControl, SapError, ScrapeContext};
use async_trait::async_trait;
use log::{debug, error};
use prometheus::proto::MetricFamily;
use std::collections::BTreeMap;
use std::sync::Arc;

/// ABAP work process table of every instance with the ABAP feature.
pub struct WorkProcessCollector {
    base: DefaultCollector,
    sap: Arc<SapControl>,
}

impl WorkProcessCollector {
    pub fn new(sap: Arc<SapControl>) -> Self {
        let mut base = DefaultCollector::new("workprocess");

        let mut count_labels = vec!["wp_type", "status"];
        count_labels.extend(INSTANCE_LABELS);
        base.set_descriptor(
            "dispatcher_work_processes",
            "Dispatcher work process counts by type and status",
            &count_labels,
        );

        let mut labels = vec!["wp_type", "status", "pid", "name", "description", "client", "user"];
        labels.extend(INSTANCE_LABELS);
        base.set_descriptor("dispatcher_work_processes_status", "Status of SAP process", &labels);
        base.set_descriptor(
            "dispatcher_work_processes_cpu",
            "CPU usage percentage of SAP process",
            &labels,
        );
        base.set_descriptor(
            "dispatcher_work_processes_elapsed",
            "Elapsed time of SAP process in seconds",
            &labels,
        );
        Self { base, sap }
    }
}

/// 1 running, 0.5 waiting, 0 anything else
pub fn work_process_status(status: &str) -> f64 {
    let status = status.to_ascii_uppercase();
    if status.contains("RUN") {
        1.0
    } else if status.contains("WAIT") {
        0.5
    } else {
        0.0
    }
}

fn record_work_process(buffer: &mut MetricBuffer<'_>, wp: &WorkProcess, common: &[String]) {
    let name = format!("WP-{}", wp.no);
    let labels = labels_with(
        &[
            wp.wp_type.as_str(),
            wp.status.as_str(),
            wp.pid.as_str(),
            name.as_str(),
            wp.reason.as_str(),
            wp.client.as_str(),
            wp.user.as_str(),
        ],
        common,
    );
    buffer.gauge(
        "dispatcher_work_processes_status",
        work_process_status(&wp.status),
        &labels,
    );
    if let Ok(cpu) = wp.cpu.trim().parse::<f64>() {
        buffer.gauge("dispatcher_work_processes_cpu", cpu, &labels);
    }
    if let Ok(elapsed) = wp.time.trim().parse::<f64>() {
        buffer.gauge("dispatcher_work_processes_elapsed", elapsed, &labels);
    }
}

#[async_trait]
impl SapCollector for WorkProcessCollector {
    fn name(&self) -> &str {
        self.base.subsystem()
    }

    async fn collect(&self, ctx: &ScrapeContext) -> Result<Vec<MetricFamily>, SapError> {
        debug!("recordWorkProcessStats collecting");
        let directory = self
            .sap
            .get_cached_instance_list(ctx)
            .await
            .map_err(|e| e.context("recordWorkProcessStats collector error"))?;
        debug!("recordWorkProcessStats: Instances in the list: {}", directory.len());

        let mut buffer = self.base.buffer();
        for info in directory.iter().filter(|i| i.has_feature("ABAP")) {
            let table = match self.sap.web_service().abap_get_wp_table(ctx, &info.endpoint).await {
                Ok(table) => table,
                Err(e) => {
                    error!("ABAPGetWPTable error {}", e);
                    continue;
                }
            };
            let common = info.common_labels();

            let mut counts: BTreeMap<(&str, &str), u32> = BTreeMap::new();
            for wp in &table.work_processes {
                *counts.entry((wp.wp_type.as_str(), wp.status.as_str())).or_default() += 1;
                record_work_process(&mut buffer, wp, &common);
            }
            for ((wp_type, status), count) in counts {
                let labels = labels_with(&[wp_type, status], &common);
                buffer.gauge("dispatcher_work_processes", count as f64, &labels);
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

    fn wp(no: &str, wp_type: &str, status: &str, cpu: &str, time: &str) -> WorkProcess {
        WorkProcess {
            no: no.to_string(),
            wp_type: wp_type.to_string(),
            pid: format!("41{}", no),
            status: status.to_string(),
            cpu: cpu.to_string(),
            time: time.to_string(),
            client: "100".to_string(),
            user: "BATCHUSER".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_work_process_status() {
        assert_eq!(work_process_status("Run"), 1.0);
        assert_eq!(work_process_status("Wait"), 0.5);
        assert_eq!(work_process_status("Stopped"), 0.0);
        assert_eq!(work_process_status(""), 0.0);
    }

    #[tokio::test]
    async fn test_counts_and_details() {
        let mut fake = FakeWebService::with_instances(1);
        fake.work_processes = vec![
            wp("0", "DIA", "Run", "0:00:12", "3"),
            wp("1", "DIA", "Wait", "0.5", ""),
            wp("2", "DIA", "Wait", "", ""),
            wp("3", "BTC", "Run", "1.25", "120"),
        ];
        let (_, sap) = sap_control(fake);
        let collector = WorkProcessCollector::new(sap);

        let families = collector.collect(&ctx()).await.unwrap();
        let counts = "sap_workprocess_dispatcher_work_processes";
        assert_eq!(series(&families, counts), 3);
        assert_eq!(value(&families, counts, &[("wp_type", "DIA"), ("status", "Wait")]), Some(2.0));
        assert_eq!(value(&families, counts, &[("wp_type", "BTC"), ("status", "Run")]), Some(1.0));

        let status = "sap_workprocess_dispatcher_work_processes_status";
        assert_eq!(series(&families, status), 4);
        assert_eq!(value(&families, status, &[("name", "WP-1")]), Some(0.5));
        assert_eq!(value(&families, status, &[("name", "WP-3"), ("SID", "PRD")]), Some(1.0));

        // unparsable readings are left out
        assert_eq!(series(&families, "sap_workprocess_dispatcher_work_processes_cpu"), 2);
        assert_eq!(
            value(&families, "sap_workprocess_dispatcher_work_processes_elapsed", &[("name", "WP-3")]),
            Some(120.0)
        );
    }

    #[tokio::test]
    async fn test_non_abap_instances_are_skipped() {
        let mut fake = FakeWebService::with_instances(1);
        fake.instances[0].features = "MESSAGESERVER|ENQUE".to_string();
        fake.work_processes = vec![wp("0", "DIA", "Run", "1", "1")];
        let (_, sap) = sap_control(fake);
        let collector = WorkProcessCollector::new(sap);

        assert!(collector.collect(&ctx()).await.unwrap().is_empty());
    }
}
