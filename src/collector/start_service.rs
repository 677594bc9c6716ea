// start_service.rs
use super::{labels_with, DefaultCollector, MetricBuffer, SapCollector, INSTANCE_LABELS};
use crate::sapcontrol::soap_types::StateColor;
use crate::sapcontrol::{SapControl, SapError, ScrapeContext};
use async_trait::async_trait;
use log::{debug, warn};
use prometheus::proto::MetricFamily;
use std::collections::HashMap;
use std::sync::Arc;

/// Instances of the whole system and the processes started by each
/// instance's sapstartsrv.
pub struct StartServiceCollector {
    base: DefaultCollector,
    sap: Arc<SapControl>,
}

impl StartServiceCollector {
    pub fn new(sap: Arc<SapControl>) -> Self {
        let mut base = DefaultCollector::new("start_service");
        base.set_descriptor(
            "instances",
            "The SAP instances in the context of the whole SAP system",
            &[
                "features",
                "start_priority",
                "instance_name",
                "instance_number",
                "SID",
                "instance_hostname",
                "dispstatus",
            ],
        );
        let mut process_labels = vec!["name", "pid", "status", "description", "starttime", "elapsedtime"];
        process_labels.extend(INSTANCE_LABELS);
        process_labels.push("proc_dispstatus");
        base.set_descriptor(
            "processes",
            "The processes started by the SAP Start Service",
            &process_labels,
        );
        for color in StateColor::ALL {
            let name = per_instance_metric(color);
            let help = format!("Processes in state {}", color_suffix(color).to_uppercase());
            base.set_descriptor(&name, &help, &INSTANCE_LABELS);
        }
        Self { base, sap }
    }

    async fn record_instances(&self, ctx: &ScrapeContext) -> Result<Vec<MetricFamily>, SapError> {
        debug!("recordInstances collecting");
        let directory = self
            .sap
            .get_cached_instance_list(ctx)
            .await
            .map_err(|e| e.context("recordInstances collector error"))?;
        debug!("recordInstances: Instances in the list: {}", directory.len());

        let mut buffer = self.base.buffer();
        for info in directory.iter() {
            let instance = &info.instance;
            let labels = vec![
                instance.features.clone(),
                instance.start_priority.clone(),
                info.name.clone(),
                info.instance_nr_label(),
                info.sid.clone(),
                instance.hostname.clone(),
                instance.dispstatus.clone(),
            ];
            buffer.gauge("instances", info.status, &labels);
        }
        Ok(buffer.into_families())
    }

    async fn record_processes(&self, ctx: &ScrapeContext) -> Result<Vec<MetricFamily>, SapError> {
        debug!("recordProcesses collecting");
        let directory = self
            .sap
            .get_cached_instance_list(ctx)
            .await
            .map_err(|e| e.context("recordProcesses collector error"))?;
        debug!("recordProcesses: Instances in the list: {}", directory.len());

        let mut buffer = self.base.buffer();
        for info in directory.iter() {
            let processes = match self.sap.get_cached_process_list(ctx, &info.endpoint).await {
                Ok(processes) => processes,
                Err(e) => {
                    warn!("GetProcessList error: {}", e);
                    continue;
                }
            };
            let common = info.common_labels();

            let mut per_color: HashMap<StateColor, u32> = HashMap::new();
            for entry in processes.iter() {
                let process = &entry.process;
                if let Ok(color) = process.dispstatus.parse::<StateColor>() {
                    *per_color.entry(color).or_default() += 1;
                }
                let pid = process.pid.to_string();
                let mut labels = labels_with(
                    &[
                        process.name.as_str(),
                        pid.as_str(),
                        process.textstatus.as_str(),
                        process.description.as_str(),
                        process.starttime.as_str(),
                        process.elapsedtime.as_str(),
                    ],
                    &common,
                );
                labels.push(process.dispstatus.clone());
                buffer.gauge("processes", entry.status, &labels);
            }
            record_per_instance(&mut buffer, &per_color, &common);
        }
        Ok(buffer.into_families())
    }
}

fn color_suffix(color: StateColor) -> &'static str {
    match color {
        StateColor::Gray => "gray",
        StateColor::Green => "green",
        StateColor::Yellow => "yellow",
        StateColor::Red => "red",
    }
}

fn per_instance_metric(color: StateColor) -> String {
    format!("processesperinstance_{}", color_suffix(color))
}

fn record_per_instance(buffer: &mut MetricBuffer<'_>, per_color: &HashMap<StateColor, u32>, common: &[String]) {
    for color in StateColor::ALL {
        let count = per_color.get(&color).copied().unwrap_or(0);
        buffer.gauge(&per_instance_metric(color), count as f64, common);
    }
}

#[async_trait]
impl SapCollector for StartServiceCollector {
    fn name(&self) -> &str {
        self.base.subsystem()
    }

    async fn collect(&self, ctx: &ScrapeContext) -> Result<Vec<MetricFamily>, SapError> {
        debug!("Collecting SAP Start Service metrics");
        let (instances, processes) = tokio::join!(self.record_instances(ctx), self.record_processes(ctx));

        let mut families = Vec::new();
        let mut first_error = None;
        for result in [instances, processes] {
            match result {
                Ok(part) => families.extend(part),
                Err(e) => {
                    warn!("Start Service Collector scrape errors: {}", e);
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) if families.is_empty() => Err(e),
            _ => Ok(families),
        }
    }
}
