// alerts.rs
use super::{labels_with, DefaultCollector, SapCollector, INSTANCE_LABELS};
use crate::loki::{LokiClient, LokiEntry};
use crate::sapcontrol::instance_cache::InstanceInfo;
use crate::sapcontrol::soap_types::{state_color_to_float, state_color_to_level, Alert};
use crate::sapcontrol::{SapControl, SapError, ScrapeContext};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use log::{debug, info, warn};
use prometheus::proto::MetricFamily;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

/// Format of the alert `Time` field, local wall clock of the SAP system.
pub const ALERT_TIME_FORMAT: &str = "%Y %m %d %H:%M:%S";

#[derive(Debug, Clone)]
pub struct AlertSettings {
    pub send_to_prom: bool,
    /// None: no age limit
    pub max_age: Option<Duration>,
}

/// Open CCMS alerts of every instance, as a gauge and/or as Loki log lines.
pub struct AlertsCollector {
    base: DefaultCollector,
    sap: Arc<SapControl>,
    loki: Option<Arc<LokiClient>>,
    settings: AlertSettings,
}

impl AlertsCollector {
    pub fn new(sap: Arc<SapControl>, loki: Option<Arc<LokiClient>>, settings: AlertSettings) -> Self {
        let mut base = DefaultCollector::new("alerts");
        let mut labels = vec!["Object", "Attribute", "Message", "ATime", "State"];
        labels.extend(INSTANCE_LABELS);
        base.set_descriptor("Alert", "SAP System open Alerts", &labels);
        Self {
            base,
            sap,
            loki,
            settings,
        }
    }

    async fn push_to_loki(&self, loki: &LokiClient, alert: &Alert, info: &InstanceInfo) -> bool {
        let timestamp = parse_alert_time(&alert.time, loki.offset());
        if too_old(&timestamp, Utc::now(), self.settings.max_age) {
            info!("Alert entry too far behind, ts={}", timestamp);
            return false;
        }
        let entry = LokiEntry {
            labels: loki_labels(alert, info),
            timestamp,
            line: alert.description.clone(),
        };
        match loki.send(entry).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Alert push to Loki: {}", e);
                false
            }
        }
    }
}

/// Drops repeated alerts, keeping the first occurrence. Tid and Aid are ignored.
pub fn remove_duplicates(alerts: Vec<Alert>) -> Vec<Alert> {
    let mut seen = HashSet::new();
    alerts
        .into_iter()
        .filter(|a| {
            seen.insert((
                a.object.clone(),
                a.attribute.clone(),
                a.value.clone(),
                a.description.clone(),
                a.time.clone(),
            ))
        })
        .collect()
}

/// Unparsable or ambiguous times fall back to now.
pub fn parse_alert_time(raw: &str, offset: FixedOffset) -> DateTime<FixedOffset> {
    let parsed = NaiveDateTime::parse_from_str(raw.trim(), ALERT_TIME_FORMAT)
        .ok()
        .and_then(|naive| offset.from_local_datetime(&naive).single());
    match parsed {
        Some(ts) => ts,
        None => {
            warn!("Alert ATime parsing: {:?}", raw);
            Utc::now().with_timezone(&offset)
        }
    }
}

pub fn too_old(ts: &DateTime<FixedOffset>, now: DateTime<Utc>, max_age: Option<Duration>) -> bool {
    let Some(max_age) = max_age else {
        return false;
    };
    // a timestamp in the future is never too old
    match now.signed_duration_since(*ts).to_std() {
        Ok(age) => age > max_age,
        Err(_) => false,
    }
}

fn loki_labels(alert: &Alert, info: &InstanceInfo) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert("Object".to_string(), alert.object.clone());
    labels.insert("Attribute".to_string(), alert.attribute.clone());
    labels.insert("State".to_string(), alert.value.clone());
    for (name, value) in INSTANCE_LABELS.iter().zip(info.common_labels()) {
        labels.insert(name.to_string(), value);
    }
    let level = state_color_to_level(&alert.value).unwrap_or_else(|(fallback, _)| fallback);
    labels.insert("level".to_string(), level.to_string());
    labels
}

#[async_trait]
impl SapCollector for AlertsCollector {
    fn name(&self) -> &str {
        self.base.subsystem()
    }

    async fn collect(&self, ctx: &ScrapeContext) -> Result<Vec<MetricFamily>, SapError> {
        debug!("recordAlerts start");
        let directory = self
            .sap
            .get_cached_instance_list(ctx)
            .await
            .map_err(|e| e.context("recordAlerts"))?;
        debug!("recordAlerts: Instances in the list: {}", directory.len());

        let mut buffer = self.base.buffer();
        for info in directory.iter() {
            let response = match self.sap.web_service().get_alerts(ctx, &info.endpoint).await {
                Ok(response) => response,
                Err(e) => {
                    warn!("GetAlerts: {}", e);
                    continue;
                }
            };

            let alerts = if self.settings.send_to_prom {
                let before = response.alerts.len();
                let alerts = remove_duplicates(response.alerts);
                debug!("Alerts in the list: {} ({} before removing duplicates)", alerts.len(), before);
                alerts
            } else {
                debug!("Alerts in the list: {}", response.alerts.len());
                response.alerts
            };

            let common = info.common_labels();
            let mut sent_to_loki = 0;
            for alert in &alerts {
                let state = match state_color_to_float(&alert.value) {
                    Ok(state) => state,
                    Err((_, e)) => {
                        warn!("recordAlerts: Alert State conversion: {}", e);
                        continue;
                    }
                };
                if self.settings.send_to_prom {
                    let labels = labels_with(
                        &[
                            alert.object.as_str(),
                            alert.attribute.as_str(),
                            alert.description.as_str(),
                            alert.time.as_str(),
                            alert.value.as_str(),
                        ],
                        &common,
                    );
                    buffer.gauge("Alert", state, &labels);
                }
                if let Some(loki) = &self.loki {
                    if self.push_to_loki(loki, alert, info).await {
                        sent_to_loki += 1;
                    }
                }
            }
            debug!("Alerts sent to loki: {}", sent_to_loki);
        }
        debug!("recordAlerts success");
        Ok(buffer.into_families())
    }
}
