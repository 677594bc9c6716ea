//! Prometheus collectors over the SAPControl caches.
//!
//! A collector owns a set of metric descriptors (name, help, label names)
//! under one subsystem. Each scrape fills a fresh [`MetricBuffer`] from those
//! descriptors and hands back the resulting metric families, so series of
//! instances that disappeared never linger.

pub mod alerts;
pub mod cache_collector;
pub mod dispatcher;
pub mod enqueue_server;
pub mod registry;
pub mod start_service;
pub mod workprocess;

use crate::sapcontrol::{SapError, ScrapeContext};
use async_trait::async_trait;
use log::warn;
use prometheus::core::Collector;
use prometheus::proto::MetricFamily;
use prometheus::{CounterVec, GaugeVec, Opts};
use std::collections::{BTreeMap, HashMap};

pub const NAMESPACE: &str = "sap";

/// instance_name, instance_number, SID, instance_hostname
pub const INSTANCE_LABELS: [&str; 4] = ["instance_name", "instance_number", "SID", "instance_hostname"];

#[async_trait]
pub trait SapCollector: Send + Sync {
    fn name(&self) -> &str;

    async fn collect(&self, ctx: &ScrapeContext) -> Result<Vec<MetricFamily>, SapError>;
}

#[derive(Debug, Clone)]
struct Descriptor {
    help: String,
    labels: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DefaultCollector {
    subsystem: String,
    descriptors: HashMap<String, Descriptor>,
}

impl DefaultCollector {
    pub fn new(subsystem: &str) -> Self {
        Self {
            subsystem: subsystem.to_string(),
            descriptors: HashMap::new(),
        }
    }

    pub fn subsystem(&self) -> &str {
        &self.subsystem
    }

    pub fn set_descriptor(&mut self, name: &str, help: &str, labels: &[&str]) {
        self.descriptors.insert(
            name.to_string(),
            Descriptor {
                help: help.to_string(),
                labels: labels.iter().map(|l| l.to_string()).collect(),
            },
        );
    }

    pub fn fq_name(&self, name: &str) -> String {
        format!("{}_{}_{}", NAMESPACE, self.subsystem, name)
    }

    pub fn buffer(&self) -> MetricBuffer<'_> {
        MetricBuffer {
            collector: self,
            gauges: BTreeMap::new(),
            counters: BTreeMap::new(),
        }
    }

    fn opts(&self, name: &str) -> Option<(Opts, Vec<&str>)> {
        let descriptor = self.descriptors.get(name)?;
        let opts = Opts::new(name, descriptor.help.clone())
            .namespace(NAMESPACE)
            .subsystem(self.subsystem.clone());
        let labels = descriptor.labels.iter().map(String::as_str).collect();
        Some((opts, labels))
    }
}

/// Samples of one scrape. Vectors are created on first use, so a descriptor
/// without samples produces no (empty) family.
pub struct MetricBuffer<'a> {
    collector: &'a DefaultCollector,
    gauges: BTreeMap<String, GaugeVec>,
    counters: BTreeMap<String, CounterVec>,
}

impl<'a> MetricBuffer<'a> {
    pub fn gauge(&mut self, name: &str, value: f64, labels: &[String]) {
        if !self.gauges.contains_key(name) {
            let Some((opts, label_names)) = self.collector.opts(name) else {
                warn!("[{}] unknown metric descriptor: {}", self.collector.subsystem, name);
                return;
            };
            match GaugeVec::new(opts, &label_names) {
                Ok(vec) => {
                    self.gauges.insert(name.to_string(), vec);
                }
                Err(e) => {
                    warn!("[{}] {}: {}", self.collector.subsystem, name, e);
                    return;
                }
            }
        }
        let values: Vec<&str> = labels.iter().map(String::as_str).collect();
        if let Some(vec) = self.gauges.get(name) {
            match vec.get_metric_with_label_values(&values) {
                Ok(gauge) => gauge.set(value),
                Err(e) => warn!("[{}] {}: {}", self.collector.subsystem, name, e),
            }
        }
    }

    /// Counters cannot go down; negative readings are dropped.
    pub fn counter(&mut self, name: &str, value: f64, labels: &[String]) {
        if value < 0.0 {
            warn!(
                "[{}] {}: negative counter value {} dropped",
                self.collector.subsystem, name, value
            );
            return;
        }
        if !self.counters.contains_key(name) {
            let Some((opts, label_names)) = self.collector.opts(name) else {
                warn!("[{}] unknown metric descriptor: {}", self.collector.subsystem, name);
                return;
            };
            match CounterVec::new(opts, &label_names) {
                Ok(vec) => {
                    self.counters.insert(name.to_string(), vec);
                }
                Err(e) => {
                    warn!("[{}] {}: {}", self.collector.subsystem, name, e);
                    return;
                }
            }
        }
        let values: Vec<&str> = labels.iter().map(String::as_str).collect();
        if let Some(vec) = self.counters.get(name) {
            match vec.get_metric_with_label_values(&values) {
                Ok(counter) => {
                    counter.reset();
                    counter.inc_by(value);
                }
                Err(e) => warn!("[{}] {}: {}", self.collector.subsystem, name, e),
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.gauges.is_empty() && self.counters.is_empty()
    }

    pub fn into_families(self) -> Vec<MetricFamily> {
        let mut families = Vec::new();
        for vec in self.gauges.values() {
            families.extend(vec.collect());
        }
        for vec in self.counters.values() {
            families.extend(vec.collect());
        }
        // a vector whose only sample was rejected still reports an empty family
        families.retain(|f| !f.get_metric().is_empty());
        families
    }
}

/// `prefix` followed by the instance labels.
pub fn labels_with(prefix: &[&str], common: &[String]) -> Vec<String> {
    prefix
        .iter()
        .map(|s| s.to_string())
        .chain(common.iter().cloned())
        .collect()
}
