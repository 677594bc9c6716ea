// metrics_handler.rs
use crate::collector::SapCollector;
use crate::sapcontrol::{SapControl, ScrapeContext};
use actix_web::{web, HttpResponse, Responder};
use log::{debug, error, warn};
use prometheus::proto::MetricFamily;
use prometheus::{Encoder, TextEncoder};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

pub struct AppState {
    pub collectors: Vec<Arc<dyn SapCollector>>,
    pub sap: Arc<SapControl>,
    pub scrape_timeout: Duration,
}

/// Runs every collector concurrently, each under its own scrape deadline, and
/// merges the result with the default registry (process metrics).
pub async fn gather(state: &AppState) -> Vec<MetricFamily> {
    let mut tasks = JoinSet::new();
    for collector in &state.collectors {
        let collector = collector.clone();
        let ctx = ScrapeContext::with_timeout(state.scrape_timeout);
        tasks.spawn(async move {
            let result = collector.collect(&ctx).await;
            (collector.name().to_string(), result)
        });
    }

    let mut families = prometheus::gather();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((name, Ok(part))) => {
                debug!("Collector {}: {} metric families", name, part.len());
                families.extend(part);
            }
            Ok((name, Err(e))) => warn!("Collector {} scrape error: {}", name, e),
            Err(e) => error!("Collector task failed: {}", e),
        }
    }
    families.retain(|f| !f.get_metric().is_empty());
    families.sort_by(|a, b| a.get_name().cmp(b.get_name()));
    families
}

pub async fn handle_metrics(state: web::Data<AppState>) -> impl Responder {
    let families = gather(state.get_ref()).await;

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&families, &mut buffer) {
        error!("Failed to encode Prometheus metrics: {}", e);
        return HttpResponse::InternalServerError().body(e.to_string());
    }
    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}

pub async fn handle_cache_stats(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(state.sap.cache_reports().await)
}
