// main.rs
// http entry point: /metrics for Prometheus, alerts pushed to Loki
use actix_web::{web, App, HttpServer};
use clap::Parser;
use log::{error, info, warn};
use std::sync::Arc;

mod cache;
mod collector;
mod config;
mod handlers;
mod loki;
mod sapcontrol;

use crate::collector::registry::build_collectors;
use crate::config::{logger, CliArgs, ExporterConfig, SidSlot};
use crate::handlers::AppState;
use crate::loki::LokiClient;
use crate::sapcontrol::instance_cache::CacheSettings;
use crate::sapcontrol::web_service::SoapWebService;
use crate::sapcontrol::{SapControl, ScrapeContext};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let args = CliArgs::parse();
    logger::init_logger();

    let config = match ExporterConfig::load(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };
    logger::set_level(&config.log_level);
    info!(
        "Starting sap_system_exporter {}, SAPControl at {}",
        env!("CARGO_PKG_VERSION"),
        config.sap_control_url
    );

    let web_service = match SoapWebService::from_config(&config) {
        Ok(web_service) => Arc::new(web_service),
        Err(e) => {
            error!("Could not create the SAPControl client: {}", e);
            std::process::exit(1);
        }
    };
    let sap = Arc::new(SapControl::new(
        web_service,
        CacheSettings::from_config(&config),
        SidSlot::new(&config.sap_sid),
    ));

    // first population; an unreachable system is retried on the first scrape
    let ctx = ScrapeContext::with_timeout(config.scrape_timeout);
    match sap.get_cached_instance_list(&ctx).await {
        Ok(directory) => info!("SAP instances found: {}", directory.len()),
        Err(e) => warn!("Could not get the SAP instance list at startup: {}", e),
    }
    match sap.sid() {
        Some(sid) => info!("SAP SID: {}", sid),
        None => warn!("SAP SID is not known yet"),
    }

    let loki = match LokiClient::from_config(&config) {
        Ok(client) => client.map(Arc::new),
        Err(e) => {
            error!("Loki client disabled: {}", e);
            None
        }
    };
    let flusher = loki.as_ref().map(|client| client.spawn_flusher());
    let cleanup = if config.cache_cleanup_interval.is_zero() {
        None
    } else {
        Some(sap.spawn_cleanup(config.cache_cleanup_interval))
    };

    let state = web::Data::new(AppState {
        collectors: build_collectors(&config, sap.clone(), loki.clone()),
        sap: sap.clone(),
        scrape_timeout: config.scrape_timeout,
    });

    info!("Serving metrics on {}:{}", config.address, config.port);
    HttpServer::new(move || App::new().app_data(state.clone()).configure(handlers::configure))
        .bind((config.address.as_str(), config.port))?
        .run()
        .await?;

    if let Some(handle) = cleanup {
        handle.abort();
    }
    if let Some(handle) = flusher {
        handle.abort();
    }
    if let Some(client) = loki {
        client.shutdown().await;
    }
    Ok(())
}
