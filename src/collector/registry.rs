// registry.rs
use super::alerts::{AlertSettings, AlertsCollector};
use super::cache_collector::CacheCollector;
use super::dispatcher::DispatcherCollector;
use super::enqueue_server::EnqueueServerCollector;
use super::start_service::StartServiceCollector;
use super::workprocess::WorkProcessCollector;
use super::SapCollector;
use crate::config::ExporterConfig;
use crate::loki::LokiClient;
use crate::sapcontrol::SapControl;
use log::{debug, info};
use std::sync::Arc;

/// Start service and cache collectors always, the rest as configured.
pub fn build_collectors(
    config: &ExporterConfig,
    sap: Arc<SapControl>,
    loki: Option<Arc<LokiClient>>,
) -> Vec<Arc<dyn SapCollector>> {
    let mut collectors: Vec<Arc<dyn SapCollector>> = vec![
        Arc::new(StartServiceCollector::new(sap.clone())),
        Arc::new(CacheCollector::new(sap.clone())),
    ];

    if config.collect_enqueueserver {
        collectors.push(Arc::new(EnqueueServerCollector::new(sap.clone())));
        info!("Enqueue Server optional collector registered");
    } else {
        debug!("Enqueue Server optional collector is not registered");
    }
    if config.collect_dispatcher {
        collectors.push(Arc::new(DispatcherCollector::new(sap.clone())));
        info!("Dispatcher optional collector registered");
    } else {
        debug!("Dispatcher optional collector is not registered");
    }
    if config.collect_workprocess {
        collectors.push(Arc::new(WorkProcessCollector::new(sap.clone())));
        info!("WorkProcess optional collector registered");
    } else {
        debug!("WorkProcess optional collector is not registered");
    }
    if config.collect_alerts {
        let settings = AlertSettings {
            send_to_prom: config.send_alerts_to_prom,
            max_age: config.alert_samples_max_age,
        };
        if settings.send_to_prom {
            debug!("Will send Alerts to Prom");
        }
        collectors.push(Arc::new(AlertsCollector::new(sap, loki, settings)));
        info!("Alerts optional collector registered");
    } else {
        debug!("Alerts optional collector is not registered");
    }
    collectors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::test_util::sap_control;
    use crate::sapcontrol::fake_web_service::FakeWebService;

    fn names(collectors: &[Arc<dyn SapCollector>]) -> Vec<String> {
        collectors.iter().map(|c| c.name().to_string()).collect()
    }

    #[test]
    fn test_all_collectors_by_default() {
        let (_, sap) = sap_control(FakeWebService::with_instances(1));
        let collectors = build_collectors(&ExporterConfig::default(), sap, None);
        assert_eq!(
            names(&collectors),
            vec!["start_service", "cache", "enqueue_server", "dispatcher", "workprocess", "alerts"]
        );
    }

    #[test]
    fn test_optional_collectors_can_be_disabled() {
        let (_, sap) = sap_control(FakeWebService::with_instances(1));
        let config = ExporterConfig {
            collect_enqueueserver: false,
            collect_alerts: false,
            ..Default::default()
        };
        let collectors = build_collectors(&config, sap, None);
        assert_eq!(
            names(&collectors),
            vec!["start_service", "cache", "dispatcher", "workprocess"]
        );
    }
}
